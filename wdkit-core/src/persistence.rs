//! Non-secret session snapshot, persisted between process runs.
//!
//! Only the network configuration, handshake results and the last active
//! wallet id are written. Secrets and runtime handles never are.

use serde::{Deserialize, Serialize};

use crate::config::WdkConfig;
use crate::defaults::SESSION_SNAPSHOT_VERSION;
use crate::error::{WdkError, WdkResult};

/// Blob key the session snapshot is stored under.
pub const SESSION_SNAPSHOT_KEY: &str = "wdk_session.cbor";

/// Atomic blob store for the session snapshot.
#[uniffi::export(with_foreign)]
pub trait SnapshotStore: Send + Sync {
    /// Reads the blob at `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, key: String) -> WdkResult<Option<Vec<u8>>>;

    /// Writes bytes atomically to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, key: String, bytes: Vec<u8>) -> WdkResult<()>;

    /// Deletes the blob at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: String) -> WdkResult<()>;
}

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Snapshot format version.
    pub version: u32,
    /// Configuration the worklet was last started with.
    pub network_config: Option<WdkConfig>,
    /// Status of the last `workletStart` handshake.
    pub worklet_start_status: Option<String>,
    /// Status of the last successful `initializeWDK`.
    pub wdk_init_status: Option<String>,
    /// Wallet that was active when the snapshot was taken.
    pub last_active_wallet_id: Option<String>,
}

impl PersistedSession {
    /// Encodes the snapshot as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Persistence`] if encoding fails.
    pub fn to_bytes(&self) -> WdkResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| WdkError::Persistence(format!("failed to encode session: {err}")))?;
        Ok(bytes)
    }

    /// Decodes a CBOR snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Persistence`] if the bytes are malformed or carry
    /// an unknown version.
    pub fn from_bytes(bytes: &[u8]) -> WdkResult<Self> {
        let session: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| WdkError::Persistence(format!("failed to decode session: {err}")))?;
        if session.version != SESSION_SNAPSHOT_VERSION {
            return Err(WdkError::Persistence(format!(
                "unsupported session version {}",
                session.version
            )));
        }
        Ok(session)
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for WdkError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Persistence(format!("unexpected uniffi callback error: {}", error.reason))
    }
}
