//! Secure credential vault interface.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::VaultError;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Platform keychain/keystore holding per-wallet credentials.
///
/// Any call may put biometric UI in front of the user. Failures of that
/// challenge come back as [`VaultError::Authentication`] and must not be
/// retried silently.
#[async_trait]
pub trait SecureVault: Send + Sync {
    /// Runs an explicit biometric or passcode challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot present the challenge.
    async fn authenticate(&self) -> VaultResult<bool>;

    /// Whether any credential is stored for `wallet_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn has_wallet(&self, wallet_id: &str) -> VaultResult<bool>;

    /// Reads the encryption key. Usually gated by biometrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read or the challenge fails.
    async fn get_encryption_key(&self, wallet_id: &str) -> VaultResult<Option<SecretString>>;

    /// Reads the encrypted seed. Not gated by biometrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn get_encrypted_seed(&self, wallet_id: &str) -> VaultResult<Option<SecretString>>;

    /// Reads the encrypted entropy.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn get_encrypted_entropy(&self, wallet_id: &str)
        -> VaultResult<Option<SecretString>>;

    /// Stores the encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encryption_key(&self, value: SecretString, wallet_id: &str) -> VaultResult<()>;

    /// Stores the encrypted seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encrypted_seed(&self, value: SecretString, wallet_id: &str) -> VaultResult<()>;

    /// Stores the encrypted entropy.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encrypted_entropy(&self, value: SecretString, wallet_id: &str)
        -> VaultResult<()>;

    /// Removes every credential stored for `wallet_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn delete_wallet(&self, wallet_id: &str) -> VaultResult<()>;
}
