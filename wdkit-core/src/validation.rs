//! Input checks run before any side effect.

use crate::error::{WdkError, WdkResult};

/// Largest account index accepted (non-hardened BIP-32 range).
pub const MAX_ACCOUNT_INDEX: u32 = (1 << 31) - 1;

const MAX_WALLET_ID_LEN: usize = 128;
const MAX_NETWORK_LEN: usize = 64;
const MAX_ASSET_ID_LEN: usize = 128;

/// Asset identifier used for a network's native currency.
pub const NATIVE_ASSET: &str = "native";

/// Number of words in a generated or imported mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum WordCount {
    /// 128 bits of entropy.
    Twelve,
    /// 256 bits of entropy.
    TwentyFour,
}

impl WordCount {
    /// Number of words.
    #[must_use]
    pub const fn words(self) -> u32 {
        match self {
            Self::Twelve => 12,
            Self::TwentyFour => 24,
        }
    }
}

impl TryFrom<u32> for WordCount {
    type Error = WdkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            12 => Ok(Self::Twelve),
            24 => Ok(Self::TwentyFour),
            other => Err(WdkError::validation(
                "word_count",
                format!("expected 12 or 24, got {other}"),
            )),
        }
    }
}

/// Checks a wallet identifier.
///
/// # Errors
///
/// Returns [`WdkError::Validation`] if the id is empty, too long, or contains
/// characters outside `[A-Za-z0-9_.:@-]`.
pub fn validate_wallet_id(wallet_id: &str) -> WdkResult<()> {
    if wallet_id.is_empty() || wallet_id.len() > MAX_WALLET_ID_LEN {
        return Err(WdkError::validation(
            "wallet_id",
            format!("length must be between 1 and {MAX_WALLET_ID_LEN}"),
        ));
    }
    if !wallet_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '@' | '-'))
    {
        return Err(WdkError::validation(
            "wallet_id",
            "contains unsupported characters",
        ));
    }
    Ok(())
}

/// Checks a network name such as `ethereum` or `polygon`.
///
/// # Errors
///
/// Returns [`WdkError::Validation`] if the name is empty, too long or not
/// lowercase `[a-z0-9_-]`.
pub fn validate_network(network: &str) -> WdkResult<()> {
    if network.is_empty() || network.len() > MAX_NETWORK_LEN {
        return Err(WdkError::validation(
            "network",
            format!("length must be between 1 and {MAX_NETWORK_LEN}"),
        ));
    }
    if !network
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
    {
        return Err(WdkError::validation(
            "network",
            "must be lowercase alphanumeric, '-' or '_'",
        ));
    }
    Ok(())
}

/// Checks an account index.
///
/// # Errors
///
/// Returns [`WdkError::Validation`] if the index is in the hardened range.
pub fn validate_account_index(account_index: u32) -> WdkResult<()> {
    if account_index > MAX_ACCOUNT_INDEX {
        return Err(WdkError::validation(
            "account_index",
            format!("must be at most {MAX_ACCOUNT_INDEX}"),
        ));
    }
    Ok(())
}

/// Checks an asset identifier: [`NATIVE_ASSET`] or a token address.
///
/// # Errors
///
/// Returns [`WdkError::Validation`] if the id is empty, too long or contains
/// whitespace.
pub fn validate_asset_id(asset_id: &str) -> WdkResult<()> {
    if asset_id.is_empty() || asset_id.len() > MAX_ASSET_ID_LEN {
        return Err(WdkError::validation(
            "asset_id",
            format!("length must be between 1 and {MAX_ASSET_ID_LEN}"),
        ));
    }
    if asset_id.chars().any(char::is_whitespace) {
        return Err(WdkError::validation("asset_id", "must not contain whitespace"));
    }
    Ok(())
}

/// Checks the shape of a mnemonic phrase without looking at its words.
///
/// # Errors
///
/// Returns [`WdkError::Validation`] unless the phrase is 12 or 24 lowercase
/// ASCII words separated by whitespace.
pub fn validate_mnemonic_shape(mnemonic: &str) -> WdkResult<WordCount> {
    let mut count = 0u32;
    for word in mnemonic.split_whitespace() {
        if !word.chars().all(|c| c.is_ascii_lowercase()) {
            // Never echo the word itself.
            return Err(WdkError::validation(
                "mnemonic",
                "words must be lowercase ASCII letters",
            ));
        }
        count += 1;
    }
    WordCount::try_from(count).map_err(|_| {
        WdkError::validation("mnemonic", format!("expected 12 or 24 words, got {count}"))
    })
}
