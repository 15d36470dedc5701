//! Errors raised by foreign collaborators.

use thiserror::Error;

use crate::error::{RpcError, VaultError};

/// Failure reported by a [`ForeignVault`](super::ForeignVault) or a
/// [`ForeignWorklet`](super::ForeignWorklet).
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum ForeignError {
    /// The biometric or passcode challenge failed or was dismissed.
    #[error("{0}")]
    Authentication(String),

    /// The platform keystore or runtime is not reachable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other failure, carrying the platform's message.
    #[error("{0}")]
    Failed(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for ForeignError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<ForeignError> for VaultError {
    fn from(error: ForeignError) -> Self {
        match error {
            ForeignError::Authentication(message) => Self::Authentication(message),
            ForeignError::Unavailable(message) => Self::Unavailable(message),
            other @ (ForeignError::Failed(_) | ForeignError::UnexpectedUniFFICallbackError(_)) => {
                Self::Other(other.to_string())
            }
        }
    }
}

impl From<ForeignError> for RpcError {
    fn from(error: ForeignError) -> Self {
        match error {
            // The worklet's own message, untouched, so decryption failures
            // are still recognized.
            ForeignError::Failed(message) => Self::new(message),
            other => Self::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_survives_into_vault_error() {
        assert_eq!(
            VaultError::from(ForeignError::Authentication("User canceled".to_string())),
            VaultError::Authentication("User canceled".to_string())
        );
        assert_eq!(
            VaultError::from(ForeignError::UnexpectedUniFFICallbackError("boom".to_string())),
            VaultError::Other("unexpected uniffi callback error: boom".to_string())
        );
    }

    #[test]
    fn test_worklet_failures_keep_their_message() {
        let error = RpcError::from(ForeignError::Failed(
            "Failed to decrypt seed: authentication tag mismatch".to_string(),
        ));
        assert_eq!(
            error.message,
            "Failed to decrypt seed: authentication tag mismatch"
        );
    }
}
