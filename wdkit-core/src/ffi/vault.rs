use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::VaultError;
use crate::vault::{SecureVault, VaultResult};

use super::ForeignError;

/// Platform keychain or keystore, implemented in Swift or Kotlin.
///
/// Same contract as [`SecureVault`]; values cross the boundary as plain
/// strings and are wrapped in [`SecretString`] as soon as they arrive.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait ForeignVault: Send + Sync {
    /// Runs an explicit biometric or passcode challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot present the challenge.
    async fn authenticate(&self) -> Result<bool, ForeignError>;

    /// Whether any credential is stored for `wallet_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn has_wallet(&self, wallet_id: String) -> Result<bool, ForeignError>;

    /// Reads the encryption key. Usually gated by biometrics.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignError::Authentication`] if the challenge fails.
    async fn get_encryption_key(&self, wallet_id: String) -> Result<Option<String>, ForeignError>;

    /// Reads the encrypted seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn get_encrypted_seed(&self, wallet_id: String) -> Result<Option<String>, ForeignError>;

    /// Reads the encrypted entropy.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    async fn get_encrypted_entropy(
        &self,
        wallet_id: String,
    ) -> Result<Option<String>, ForeignError>;

    /// Stores the encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encryption_key(&self, wallet_id: String, value: String)
        -> Result<(), ForeignError>;

    /// Stores the encrypted seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encrypted_seed(&self, wallet_id: String, value: String)
        -> Result<(), ForeignError>;

    /// Stores the encrypted entropy.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_encrypted_entropy(
        &self,
        wallet_id: String,
        value: String,
    ) -> Result<(), ForeignError>;

    /// Removes every credential stored for `wallet_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn delete_wallet(&self, wallet_id: String) -> Result<(), ForeignError>;
}

/// Presents a [`ForeignVault`] as a [`SecureVault`].
pub(crate) struct VaultBridge(pub(crate) Arc<dyn ForeignVault>);

fn secret(value: Option<String>) -> Option<SecretString> {
    value.map(SecretString::from)
}

#[async_trait]
impl SecureVault for VaultBridge {
    async fn authenticate(&self) -> VaultResult<bool> {
        Ok(self.0.authenticate().await?)
    }

    async fn has_wallet(&self, wallet_id: &str) -> VaultResult<bool> {
        Ok(self.0.has_wallet(wallet_id.to_string()).await?)
    }

    async fn get_encryption_key(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        let value = self.0.get_encryption_key(wallet_id.to_string()).await?;
        Ok(secret(value))
    }

    async fn get_encrypted_seed(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        let value = self.0.get_encrypted_seed(wallet_id.to_string()).await?;
        Ok(secret(value))
    }

    async fn get_encrypted_entropy(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        let value = self.0.get_encrypted_entropy(wallet_id.to_string()).await?;
        Ok(secret(value))
    }

    async fn set_encryption_key(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.0
            .set_encryption_key(wallet_id.to_string(), value.expose_secret().to_owned())
            .await
            .map_err(VaultError::from)
    }

    async fn set_encrypted_seed(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.0
            .set_encrypted_seed(wallet_id.to_string(), value.expose_secret().to_owned())
            .await
            .map_err(VaultError::from)
    }

    async fn set_encrypted_entropy(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.0
            .set_encrypted_entropy(wallet_id.to_string(), value.expose_secret().to_owned())
            .await
            .map_err(VaultError::from)
    }

    async fn delete_wallet(&self, wallet_id: &str) -> VaultResult<()> {
        self.0
            .delete_wallet(wallet_id.to_string())
            .await
            .map_err(VaultError::from)
    }
}
