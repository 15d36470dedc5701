//! Error types for the orchestration engine and its collaborators.

use thiserror::Error;

use crate::sanitize::sanitize_error_message;

/// Result type for orchestration operations.
pub type WdkResult<T> = Result<T, WdkError>;

/// Error outputs from `WDKit`.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum WdkError {
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {field}: {reason}")]
    Validation {
        /// Name of the offending input.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The worklet is not started or the WDK is not initialized.
    #[error("not_initialized: {0}")]
    NotInitialized(String),
    /// The secure vault rejected the biometric or passcode challenge.
    #[error("authentication_failed: {0}")]
    Authentication(String),
    /// The encryption key cannot decrypt the encrypted seed.
    #[error("decryption_mismatch: {0}")]
    DecryptionMismatch(String),
    /// A worklet RPC call failed or returned an unparseable payload.
    #[error("transport_error: {component}.{operation}: {message}")]
    Transport {
        /// Component issuing the call.
        component: String,
        /// Operation that failed.
        operation: String,
        /// Causal message from the transport.
        message: String,
    },
    /// A newer operation on the same logical target took over.
    #[error("superseded: {target}")]
    Superseded {
        /// The logical target (usually a wallet id).
        target: String,
    },
    /// The caller aborted the operation.
    #[error("cancelled: {operation}")]
    Cancelled {
        /// Operation that observed the abort.
        operation: String,
    },
    /// The vault has no wallet under this identifier.
    #[error("wallet_not_found: {wallet_id}")]
    WalletNotFound {
        /// Requested wallet identifier.
        wallet_id: String,
    },
    /// The vault already holds a wallet under this identifier.
    #[error("wallet_already_exists: {wallet_id}")]
    WalletAlreadyExists {
        /// Requested wallet identifier.
        wallet_id: String,
    },
    /// The vault holds the wallet but one of its credentials is missing.
    #[error("missing_credential: {field} for {wallet_id}")]
    MissingCredential {
        /// Wallet identifier.
        wallet_id: String,
        /// Which credential was absent.
        field: String,
    },
    /// Any other vault failure.
    #[error("vault_error: {0}")]
    Vault(String),
    /// Snapshot encoding or storage failure.
    #[error("persistence_error: {0}")]
    Persistence(String),
}

impl WdkError {
    /// Creates a validation error.
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Normalizes a collaborator failure into a `Transport` error tagged with
    /// the component and operation.
    ///
    /// Errors that are already `Transport` pass through untouched so that a
    /// failure is never wrapped twice on its way up.
    pub fn transport<E: Into<TransportSource>>(component: &str, operation: &str, err: E) -> Self {
        let message = match err.into() {
            TransportSource::Wdk(already @ Self::Transport { .. }) => return already,
            TransportSource::Wdk(other) => other.to_string(),
            TransportSource::Rpc(rpc) => rpc.message,
        };
        Self::Transport {
            component: component.to_string(),
            operation: operation.to_string(),
            message,
        }
    }

    /// Returns the message with secret-looking substrings redacted.
    ///
    /// Use this for anything that may reach a user-facing surface or a log.
    #[must_use]
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Whether this error came from a failed biometric or passcode challenge.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Errors raised by a [`SecureVault`](crate::vault::SecureVault) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Biometric or passcode challenge failed or was dismissed.
    #[error("{0}")]
    Authentication(String),
    /// Keychain/keystore not reachable.
    #[error("vault unavailable: {0}")]
    Unavailable(String),
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl From<VaultError> for WdkError {
    fn from(error: VaultError) -> Self {
        match error {
            // Passed through verbatim so callers can branch on it.
            VaultError::Authentication(message) => Self::Authentication(message),
            other => Self::Vault(other.to_string()),
        }
    }
}

/// Errors raised by the worklet runtime or its RPC client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    /// Failure message as reported by the worklet.
    pub message: String,
    /// Optional machine-readable code.
    pub code: Option<String>,
}

impl RpcError {
    /// Creates an RPC error from a message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a machine-readable code.
    #[must_use]
    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Anything [`WdkError::transport`] can normalize.
#[derive(Debug)]
pub enum TransportSource {
    /// A raw failure reported by the worklet.
    Rpc(RpcError),
    /// An error already inside the engine's taxonomy.
    Wdk(WdkError),
}

impl From<RpcError> for TransportSource {
    fn from(error: RpcError) -> Self {
        Self::Rpc(error)
    }
}

impl From<WdkError> for TransportSource {
    fn from(error: WdkError) -> Self {
        Self::Wdk(error)
    }
}

impl From<serde_json::Error> for TransportSource {
    fn from(error: serde_json::Error) -> Self {
        Self::Rpc(RpcError::new(format!("unparseable payload: {error}")))
    }
}

const DECRYPTION_PATTERNS: &[&str] = &[
    "decrypt",
    "authentication tag",
    "cipher",
    "mac check",
    "invalid key",
];

/// Classifies a failed `initializeWDK` call.
///
/// The worklet reports a key that cannot open the seed only through its
/// message, so the message is matched against known decryption failures.
pub(crate) fn classify_initialize_error(error: RpcError) -> WdkError {
    let lowered = error.message.to_lowercase();
    if DECRYPTION_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
    {
        WdkError::DecryptionMismatch(error.message)
    } else {
        WdkError::transport("worklet", "initializeWDK", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_never_double_wrapped() {
        let first = WdkError::transport("worklet", "callMethod", RpcError::new("boom"));
        let second = WdkError::transport("accounts", "getAddress", first.clone());
        assert_eq!(first, second);
        match second {
            WdkError::Transport {
                component,
                operation,
                message,
            } => {
                assert_eq!(component, "worklet");
                assert_eq!(operation, "callMethod");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transport_wraps_other_errors_with_context() {
        let err = WdkError::transport("vault", "getEncryptedSeed", WdkError::Vault("gone".into()));
        assert!(matches!(
            err,
            WdkError::Transport { ref operation, .. } if operation == "getEncryptedSeed"
        ));
        assert!(err.to_string().contains("vault_error: gone"));
    }

    #[test]
    fn test_authentication_passes_through_unchanged() {
        let err: WdkError = VaultError::Authentication("User canceled".into()).into();
        assert_eq!(err, WdkError::Authentication("User canceled".into()));
        assert!(err.is_authentication());
    }

    #[test]
    fn test_classify_initialize_error() {
        let err = classify_initialize_error(RpcError::new(
            "Error: Failed to decrypt seed: unsupported state",
        ));
        assert!(matches!(err, WdkError::DecryptionMismatch(_)));

        let err = classify_initialize_error(RpcError::new("socket closed"));
        assert!(matches!(
            err,
            WdkError::Transport { ref operation, .. } if operation == "initializeWDK"
        ));
    }

    #[test]
    fn test_user_message_redacts_secrets() {
        let secret = "ab".repeat(32);
        let err = WdkError::transport(
            "worklet",
            "initializeWDK",
            RpcError::new(format!("bad key {secret}")),
        );
        assert!(err.to_string().contains(&secret));
        assert!(!err.user_message().contains(&secret));
    }
}
