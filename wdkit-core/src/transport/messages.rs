//! Request and response payloads exchanged with the worklet.
//!
//! Field names follow the worklet's camelCase JSON. Payloads that carry key
//! material are wiped on drop and never print their secret fields.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// `workletStart` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkletStartRequest {
    /// Network configuration as a JSON string.
    pub config: String,
}

/// Status reply to `workletStart` and `initializeWDK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Opaque status string reported by the worklet.
    pub status: String,
}

/// Generic account-scoped method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMethodRequest {
    /// Worklet method, e.g. `getAddress`.
    pub method_name: String,
    /// Network name.
    pub network: String,
    /// Account index on that network.
    pub account_index: u32,
    /// Arguments as a JSON string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

/// Reply to `callMethod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMethodResponse {
    /// Result as a JSON string.
    pub result: String,
}

/// `initializeWDK` request.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct InitializeWdkRequest {
    /// Encryption key for the seed.
    pub encryption_key: String,
    /// Encrypted seed.
    pub encrypted_seed: String,
    /// Network configuration as a JSON string.
    pub config: String,
}

impl fmt::Debug for InitializeWdkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializeWdkRequest")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `generateEntropyAndEncrypt` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEntropyRequest {
    /// 12 or 24.
    pub word_count: u32,
}

/// `getMnemonicFromEntropy` request.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct MnemonicFromEntropyRequest {
    /// Encrypted entropy.
    pub encrypted_entropy: String,
    /// Encryption key for the entropy.
    pub encryption_key: String,
}

impl fmt::Debug for MnemonicFromEntropyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MnemonicFromEntropyRequest")
            .finish_non_exhaustive()
    }
}

/// Reply to `getMnemonicFromEntropy`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct MnemonicResponse {
    /// Plaintext mnemonic phrase.
    pub mnemonic: String,
}

impl fmt::Debug for MnemonicResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MnemonicResponse").finish_non_exhaustive()
    }
}

/// `getSeedAndEntropyFromMnemonic` request.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SeedFromMnemonicRequest {
    /// Plaintext mnemonic phrase.
    pub mnemonic: String,
}

impl fmt::Debug for SeedFromMnemonicRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedFromMnemonicRequest")
            .finish_non_exhaustive()
    }
}

/// Reply to `generateEntropyAndEncrypt` and
/// `getSeedAndEntropyFromMnemonic`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct WalletMaterialResponse {
    /// Fresh encryption key.
    pub encryption_key: String,
    /// Seed encrypted under `encryption_key`.
    pub encrypted_seed_buffer: String,
    /// Entropy encrypted under `encryption_key`.
    pub encrypted_entropy_buffer: String,
}

impl fmt::Debug for WalletMaterialResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletMaterialResponse")
            .finish_non_exhaustive()
    }
}

/// Newly derived wallet material, ready to be written to the vault.
#[derive(Debug)]
pub struct EncryptedWalletMaterial {
    /// Encryption key.
    pub encryption_key: SecretString,
    /// Encrypted seed.
    pub encrypted_seed: SecretString,
    /// Encrypted entropy.
    pub encrypted_entropy: SecretString,
}

impl From<WalletMaterialResponse> for EncryptedWalletMaterial {
    fn from(mut response: WalletMaterialResponse) -> Self {
        Self {
            encryption_key: SecretString::from(std::mem::take(&mut response.encryption_key)),
            encrypted_seed: SecretString::from(std::mem::take(
                &mut response.encrypted_seed_buffer,
            )),
            encrypted_entropy: SecretString::from(std::mem::take(
                &mut response.encrypted_entropy_buffer,
            )),
        }
    }
}
