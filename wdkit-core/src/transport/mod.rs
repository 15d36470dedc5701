//! Worklet runtime and RPC interfaces.
//!
//! The worklet is an isolated execution engine reached over an IPC channel.
//! A [`WorkletHost`] constructs runtimes and RPC clients; the lifecycle owns
//! the handles it gets back and releases them through [`Closable`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RpcError;

mod messages;
pub use messages::*;

/// Result type for worklet calls.
pub type RpcResult<T> = Result<T, RpcError>;

/// A handle that can release its resources.
#[async_trait]
pub trait Closable: Send + Sync {
    /// Releases the handle. The default does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; callers treat it as best-effort.
    async fn close(&self) -> RpcResult<()> {
        Ok(())
    }
}

/// Opaque IPC channel exposed by a started runtime.
#[derive(Clone)]
pub struct IpcHandle(Arc<dyn Any + Send + Sync>);

impl IpcHandle {
    /// Wraps a host-specific channel.
    pub fn new<T: Any + Send + Sync>(channel: T) -> Self {
        Self(Arc::new(channel))
    }

    /// Returns the channel if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for IpcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IpcHandle").finish_non_exhaustive()
    }
}

/// An isolated execution context able to run the wallet bundle.
#[async_trait]
pub trait WorkletRuntime: Closable {
    /// Loads and starts `bundle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be loaded or started.
    async fn start(&self, bundle_path: &str, bundle: &[u8]) -> RpcResult<()>;

    /// The IPC channel of a started runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is not started.
    fn ipc(&self) -> RpcResult<IpcHandle>;
}

/// RPC client bound to a runtime's IPC channel.
#[async_trait]
pub trait WorkletRpc: Closable {
    /// Sends the configuration handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the worklet rejects the configuration.
    async fn worklet_start(&self, request: WorkletStartRequest) -> RpcResult<StatusResponse>;

    /// Invokes an account-scoped method.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails inside the worklet.
    async fn call_method(&self, request: CallMethodRequest) -> RpcResult<CallMethodResponse>;

    /// Initializes the wallet inside the worklet.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot decrypt the seed or the call fails.
    async fn initialize_wdk(&self, request: InitializeWdkRequest) -> RpcResult<StatusResponse>;

    /// Generates fresh entropy and returns it encrypted with a new key.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    async fn generate_entropy_and_encrypt(
        &self,
        request: GenerateEntropyRequest,
    ) -> RpcResult<WalletMaterialResponse>;

    /// Decrypts entropy back into its mnemonic.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails.
    async fn get_mnemonic_from_entropy(
        &self,
        request: MnemonicFromEntropyRequest,
    ) -> RpcResult<MnemonicResponse>;

    /// Derives and encrypts seed and entropy from a mnemonic.
    ///
    /// # Errors
    ///
    /// Returns an error if the mnemonic is rejected.
    async fn get_seed_and_entropy_from_mnemonic(
        &self,
        request: SeedFromMnemonicRequest,
    ) -> RpcResult<WalletMaterialResponse>;
}

/// Factory for runtimes and RPC clients.
#[async_trait]
pub trait WorkletHost: Send + Sync {
    /// Constructs a new, not yet started runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot create a runtime.
    async fn spawn_runtime(&self) -> RpcResult<Arc<dyn WorkletRuntime>>;

    /// Builds an RPC client over `ipc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is unusable.
    async fn connect(&self, ipc: IpcHandle) -> RpcResult<Arc<dyn WorkletRpc>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    #[async_trait]
    impl Closable for Plain {}

    #[tokio::test]
    async fn test_default_close_is_a_no_op() {
        assert!(Plain.close().await.is_ok());
    }

    #[test]
    fn test_ipc_handle_downcast() {
        let handle = IpcHandle::new(42u32);
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        assert!(handle.downcast_ref::<String>().is_none());
    }
}
