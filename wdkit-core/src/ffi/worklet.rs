use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::RpcError;
use crate::transport::{
    CallMethodRequest, CallMethodResponse, Closable, GenerateEntropyRequest, InitializeWdkRequest,
    IpcHandle, MnemonicFromEntropyRequest, MnemonicResponse, RpcResult, SeedFromMnemonicRequest,
    StatusResponse, WalletMaterialResponse, WorkletHost, WorkletRpc, WorkletRuntime,
    WorkletStartRequest,
};

use super::ForeignError;

/// Builds worklet runtimes on the platform side.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait ForeignWorkletHost: Send + Sync {
    /// Constructs a new, not yet started runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot create a runtime.
    async fn spawn(&self) -> Result<Arc<dyn ForeignWorklet>, ForeignError>;
}

/// One worklet runtime together with its IPC channel.
///
/// Requests carry the method name (`workletStart`, `callMethod`,
/// `initializeWDK`, ...) and a camelCase JSON payload; the reply is the JSON
/// the worklet answered with.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait ForeignWorklet: Send + Sync {
    /// Loads and starts `bundle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be loaded or started.
    async fn start(&self, bundle_path: String, bundle: Vec<u8>) -> Result<(), ForeignError>;

    /// Sends one request over the IPC channel and returns the reply.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignError::Failed`] with the worklet's message if the
    /// call fails inside the worklet.
    async fn request(&self, method: String, payload: String) -> Result<String, ForeignError>;

    /// Tears the runtime and its channel down.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; it is logged and ignored.
    async fn close(&self) -> Result<(), ForeignError>;
}

/// Presents a [`ForeignWorkletHost`] as a [`WorkletHost`].
pub(crate) struct WorkletBridge(pub(crate) Arc<dyn ForeignWorkletHost>);

#[async_trait]
impl WorkletHost for WorkletBridge {
    async fn spawn_runtime(&self) -> RpcResult<Arc<dyn WorkletRuntime>> {
        let worklet = self.0.spawn().await?;
        Ok(Arc::new(RuntimeBridge {
            worklet,
            started: AtomicBool::new(false),
        }))
    }

    async fn connect(&self, ipc: IpcHandle) -> RpcResult<Arc<dyn WorkletRpc>> {
        let channel = ipc
            .downcast_ref::<Channel>()
            .ok_or_else(|| RpcError::new("unknown ipc channel"))?;
        Ok(Arc::new(RpcBridge {
            worklet: Arc::clone(&channel.0),
        }))
    }
}

struct Channel(Arc<dyn ForeignWorklet>);

struct RuntimeBridge {
    worklet: Arc<dyn ForeignWorklet>,
    started: AtomicBool,
}

#[async_trait]
impl Closable for RuntimeBridge {
    async fn close(&self) -> RpcResult<()> {
        Ok(self.worklet.close().await?)
    }
}

#[async_trait]
impl WorkletRuntime for RuntimeBridge {
    async fn start(&self, bundle_path: &str, bundle: &[u8]) -> RpcResult<()> {
        self.worklet
            .start(bundle_path.to_string(), bundle.to_vec())
            .await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ipc(&self) -> RpcResult<IpcHandle> {
        if self.started.load(Ordering::SeqCst) {
            Ok(IpcHandle::new(Channel(Arc::clone(&self.worklet))))
        } else {
            Err(RpcError::new("runtime not started"))
        }
    }
}

/// Closing the runtime closes its channel, so the client keeps the default
/// no-op [`Closable::close`].
struct RpcBridge {
    worklet: Arc<dyn ForeignWorklet>,
}

impl RpcBridge {
    async fn request<Req, Resp>(&self, method: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_string(request)
            .map_err(|_| RpcError::new(format!("unserializable {method} request")))?;
        let reply = Zeroizing::new(self.worklet.request(method.to_string(), payload).await?);
        serde_json::from_str(&reply)
            .map_err(|_| RpcError::new(format!("unparseable {method} reply")))
    }
}

#[async_trait]
impl Closable for RpcBridge {}

#[async_trait]
impl WorkletRpc for RpcBridge {
    async fn worklet_start(&self, request: WorkletStartRequest) -> RpcResult<StatusResponse> {
        self.request("workletStart", &request).await
    }

    async fn call_method(&self, request: CallMethodRequest) -> RpcResult<CallMethodResponse> {
        self.request("callMethod", &request).await
    }

    async fn initialize_wdk(&self, request: InitializeWdkRequest) -> RpcResult<StatusResponse> {
        self.request("initializeWDK", &request).await
    }

    async fn generate_entropy_and_encrypt(
        &self,
        request: GenerateEntropyRequest,
    ) -> RpcResult<WalletMaterialResponse> {
        self.request("generateEntropyAndEncrypt", &request).await
    }

    async fn get_mnemonic_from_entropy(
        &self,
        request: MnemonicFromEntropyRequest,
    ) -> RpcResult<MnemonicResponse> {
        self.request("getMnemonicFromEntropy", &request).await
    }

    async fn get_seed_and_entropy_from_mnemonic(
        &self,
        request: SeedFromMnemonicRequest,
    ) -> RpcResult<WalletMaterialResponse> {
        self.request("getSeedAndEntropyFromMnemonic", &request).await
    }
}
