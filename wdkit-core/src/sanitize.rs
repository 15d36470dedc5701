//! Redaction of secret-looking substrings from error messages.
//!
//! Worklet and vault failures sometimes echo their inputs. Anything shaped
//! like key material (long hex or base64 runs) or a mnemonic phrase is
//! replaced before a message reaches a log sink or the UI.

use std::sync::LazyLock;

use regex::Regex;

static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:0x)?[0-9a-fA-F]{32,}").expect("static regex is valid")
});

static BASE64_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9+/_-]{40,}={0,2}").expect("static regex is valid")
});

// BIP-39 words are 3 to 8 lowercase letters; 12 is the shortest phrase.
static MNEMONIC_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-z]{3,8}\s+){11,}[a-z]{3,8}\b").expect("static regex is valid")
});

/// Marker substituted for hex-encoded material.
pub const REDACTED_HEX: &str = "[REDACTED_HEX]";
/// Marker substituted for base64-encoded material.
pub const REDACTED_BASE64: &str = "[REDACTED_B64]";
/// Marker substituted for mnemonic-shaped word runs.
pub const REDACTED_MNEMONIC: &str = "[REDACTED_MNEMONIC]";

/// Redacts hex runs of 32+ digits, base64 runs of 40+ characters and runs of
/// 12+ lowercase words from `message`.
#[must_use]
#[uniffi::export]
pub fn sanitize_error_message(message: &str) -> String {
    let message = MNEMONIC_RUN.replace_all(message, REDACTED_MNEMONIC);
    let message = HEX_RUN.replace_all(&message, REDACTED_HEX);
    BASE64_RUN.replace_all(&message, REDACTED_BASE64).into_owned()
}
