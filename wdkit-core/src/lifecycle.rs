//! Worklet lifecycle state machine.
//!
//! `Idle → Starting → Started → Initializing → Initialized`. A failed start
//! reverts to idle. A failed initialization reverts only the initialized flag
//! and the active secrets; the worklet keeps running so a retry is fast.

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use crate::config::{WdkConfig, WorkletBundle};
use crate::credentials::WalletCredentials;
use crate::error::{classify_initialize_error, WdkError, WdkResult};
use crate::mutex::OperationMutex;
use crate::transport::{
    CallMethodRequest, Closable, EncryptedWalletMaterial, GenerateEntropyRequest,
    InitializeWdkRequest, MnemonicFromEntropyRequest, SeedFromMnemonicRequest, WorkletHost,
    WorkletRpc, WorkletRuntime, WorkletStartRequest,
};
use crate::validation::WordCount;

const INITIALIZE_KEY: &str = "initializeWDK";
const START_KEY: &str = "startWorklet";

/// Result of [`WorkletLifecycle::start_worklet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum StartOutcome {
    /// This call started the worklet.
    Started,
    /// The worklet was already running.
    AlreadyStarted,
    /// Another call is starting it; see
    /// [`WorkletLifecycle::wait_until_started`].
    InProgress,
}

/// Result of [`WorkletLifecycle::initialize_wdk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum InitOutcome {
    /// The worklet was initialized with the given credentials.
    Initialized,
    /// It was already initialized with exactly these credentials.
    AlreadyInitialized,
}

/// Read-only view of the lifecycle, safe to hand to a UI layer.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct LifecycleSnapshot {
    /// A runtime is running and has accepted its configuration.
    pub is_started: bool,
    /// A wallet is initialized inside the worklet.
    pub is_initialized: bool,
    /// A start or initialization is in flight.
    pub is_loading: bool,
    /// Last fatal error, already sanitized.
    pub error: Option<String>,
    /// Configuration the worklet was started with, as JSON.
    pub network_config: Option<String>,
    /// Status returned by the `workletStart` handshake.
    pub worklet_start_status: Option<String>,
    /// Status returned by the last successful `initializeWDK`.
    pub wdk_init_status: Option<String>,
}

#[derive(Default)]
struct RuntimeState {
    runtime: Option<Arc<dyn WorkletRuntime>>,
    rpc: Option<Arc<dyn WorkletRpc>>,
    is_started: bool,
    is_initialized: bool,
    is_loading: bool,
    error: Option<String>,
    active_credentials: Option<WalletCredentials>,
    network_config: Option<WdkConfig>,
    worklet_start_status: Option<String>,
    wdk_init_status: Option<String>,
    /// Bumped whenever the wallet loaded in the worklet may have changed.
    wallet_epoch: u64,
    /// Bumped on shutdown.
    runtime_epoch: u64,
}

impl RuntimeState {
    const fn is_starting(&self) -> bool {
        self.is_loading && !self.is_started
    }
}

/// Owns the worklet runtime, its RPC client and the lifecycle flags.
pub struct WorkletLifecycle {
    host: Arc<dyn WorkletHost>,
    bundle: WorkletBundle,
    state: Mutex<RuntimeState>,
    settled: Notify,
    operations: OperationMutex,
}

impl std::fmt::Debug for WorkletLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkletLifecycle")
            .field("bundle", &self.bundle)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl WorkletLifecycle {
    /// Creates an idle lifecycle.
    #[must_use]
    pub fn new(host: Arc<dyn WorkletHost>, bundle: WorkletBundle) -> Self {
        Self {
            host,
            bundle,
            state: Mutex::new(RuntimeState::default()),
            settled: Notify::new(),
            operations: OperationMutex::new(),
        }
    }

    /// Starts the worklet with `config`.
    ///
    /// Returns early if the worklet is already started or a start is in
    /// flight. Any leftover runtime is torn down first.
    ///
    /// # Errors
    ///
    /// Returns the failure of any boot step. The lifecycle is back to idle
    /// with `error` set and every handle built so far is closed. Returns
    /// [`WdkError::Superseded`] if [`shutdown`](Self::shutdown) ran meanwhile.
    pub async fn start_worklet(&self, config: WdkConfig) -> WdkResult<StartOutcome> {
        let config_json = config.to_json()?;
        let (epoch, stale_rpc, stale_runtime) = {
            let mut state = self.state();
            if state.is_started {
                return Ok(StartOutcome::AlreadyStarted);
            }
            if state.is_loading {
                tracing::debug!("worklet start already in progress");
                return Ok(StartOutcome::InProgress);
            }
            state.is_loading = true;
            state.error = None;
            (state.runtime_epoch, state.rpc.take(), state.runtime.take())
        };
        let guard = LoadingGuard::new(self);

        close_quietly(stale_rpc, stale_runtime).await;

        tracing::info!(bundle = %self.bundle.path, "starting worklet");
        let booted = self.boot(epoch, config_json).await;

        let (err, rpc, runtime) = {
            let mut state = self.state();
            if state.runtime_epoch != epoch {
                drop(state);
                guard.settle();
                tracing::warn!("worklet shut down while starting");
                return Err(WdkError::Superseded {
                    target: START_KEY.to_string(),
                });
            }
            match booted {
                Ok(status) => {
                    state.is_started = true;
                    state.is_loading = false;
                    state.network_config = Some(config);
                    state.worklet_start_status = Some(status);
                    drop(state);
                    guard.settle();
                    tracing::info!("worklet started");
                    return Ok(StartOutcome::Started);
                }
                Err(err) => {
                    state.error = Some(err.user_message());
                    state.is_loading = false;
                    state.is_started = false;
                    let (rpc, runtime) = (state.rpc.take(), state.runtime.take());
                    drop(state);
                    guard.settle();
                    (err, rpc, runtime)
                }
            }
        };
        close_quietly(rpc, runtime).await;
        tracing::error!(error = %err.user_message(), "worklet start failed");
        Err(err)
    }

    /// Builds the runtime and its client, parking each handle in the state as
    /// soon as it exists so a dropped start cannot leak it.
    async fn boot(&self, epoch: u64, config_json: String) -> WdkResult<String> {
        let runtime = self
            .host
            .spawn_runtime()
            .await
            .map_err(|err| WdkError::transport("worklet", "spawnRuntime", err))?;
        self.park(epoch, Some(Arc::clone(&runtime)), None).await?;

        runtime
            .start(&self.bundle.path, &self.bundle.bytes)
            .await
            .map_err(|err| WdkError::transport("worklet", "start", err))?;
        let ipc = runtime
            .ipc()
            .map_err(|err| WdkError::transport("worklet", "ipc", err))?;
        let rpc = self
            .host
            .connect(ipc)
            .await
            .map_err(|err| WdkError::transport("worklet", "connect", err))?;
        self.park(epoch, None, Some(Arc::clone(&rpc))).await?;

        rpc.worklet_start(WorkletStartRequest {
            config: config_json,
        })
        .await
        .map(|response| response.status)
        .map_err(|err| WdkError::transport("worklet", "workletStart", err))
    }

    async fn park(
        &self,
        epoch: u64,
        runtime: Option<Arc<dyn WorkletRuntime>>,
        rpc: Option<Arc<dyn WorkletRpc>>,
    ) -> WdkResult<()> {
        {
            let mut state = self.state();
            if state.runtime_epoch == epoch {
                if runtime.is_some() {
                    state.runtime = runtime;
                }
                if rpc.is_some() {
                    state.rpc = rpc;
                }
                return Ok(());
            }
        }
        close_quietly(rpc, runtime).await;
        Err(WdkError::Superseded {
            target: START_KEY.to_string(),
        })
    }

    /// Waits for an in-flight start to settle.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] if the worklet is not started and
    /// no start is in flight, carrying the last start error if there is one.
    pub async fn wait_until_started(&self) -> WdkResult<()> {
        loop {
            let mut notified = pin!(self.settled.notified());
            notified.as_mut().enable();
            {
                let state = self.state();
                if state.is_started {
                    return Ok(());
                }
                if !state.is_starting() {
                    let reason = state
                        .error
                        .clone()
                        .unwrap_or_else(|| "worklet not started".to_string());
                    return Err(WdkError::NotInitialized(reason));
                }
            }
            notified.await;
        }
    }

    /// Initializes the wallet inside the running worklet.
    ///
    /// Calls are serialized. Initializing again with the credentials already
    /// active is a no-op.
    ///
    /// # Errors
    ///
    /// - [`WdkError::NotInitialized`] if the worklet is not started.
    /// - [`WdkError::DecryptionMismatch`] if the key cannot open the seed.
    /// - [`WdkError::Superseded`] if [`reset`](Self::reset) or
    ///   [`shutdown`](Self::shutdown) ran while the worklet was initializing.
    ///   Nothing is committed.
    /// - [`WdkError::Transport`] for any other worklet failure.
    pub async fn initialize_wdk(&self, credentials: WalletCredentials) -> WdkResult<InitOutcome> {
        self.operations
            .with_mutex(INITIALIZE_KEY, || self.initialize_serialized(credentials))
            .await
    }

    async fn initialize_serialized(
        &self,
        credentials: WalletCredentials,
    ) -> WdkResult<InitOutcome> {
        let (rpc, config_json, epoch) = {
            let mut state = self.state();
            if !state.is_started {
                return Err(WdkError::NotInitialized("worklet not started".to_string()));
            }
            let already = state.is_initialized
                && state
                    .active_credentials
                    .as_ref()
                    .is_some_and(|active| active.matches(&credentials));
            if already {
                return Ok(InitOutcome::AlreadyInitialized);
            }
            let rpc = state
                .rpc
                .clone()
                .ok_or_else(|| WdkError::NotInitialized("worklet not started".to_string()))?;
            let config_json = state
                .network_config
                .as_ref()
                .map(WdkConfig::to_json)
                .transpose()?
                .unwrap_or_else(|| "{}".to_string());
            state.is_loading = true;
            state.error = None;
            state.wallet_epoch += 1;
            (rpc, config_json, state.wallet_epoch)
        };
        let guard = LoadingGuard::new(self);

        let request = InitializeWdkRequest {
            encryption_key: credentials.encryption_key().expose_secret().to_owned(),
            encrypted_seed: credentials.encrypted_seed().expose_secret().to_owned(),
            config: config_json,
        };
        let result = rpc.initialize_wdk(request).await;

        let mut state = self.state();
        state.is_loading = false;
        if state.wallet_epoch != epoch {
            // A reset or shutdown landed while the worklet was initializing.
            drop(state);
            guard.settle();
            tracing::warn!("wdk initialization superseded by a reset");
            return Err(WdkError::Superseded {
                target: INITIALIZE_KEY.to_string(),
            });
        }
        state.wallet_epoch += 1;
        let outcome = match result {
            Ok(response) => {
                state.is_initialized = true;
                state.active_credentials = Some(credentials);
                state.error = None;
                state.wdk_init_status = Some(response.status);
                Ok(InitOutcome::Initialized)
            }
            Err(err) => {
                let err = classify_initialize_error(err);
                state.is_initialized = false;
                state.active_credentials = None;
                state.wdk_init_status = None;
                state.error = Some(err.user_message());
                Err(err)
            }
        };
        drop(state);
        guard.settle();
        match &outcome {
            Ok(_) => tracing::info!("wdk initialized"),
            Err(err) => tracing::warn!(error = %err.user_message(), "wdk initialization failed"),
        }
        outcome
    }

    /// Generates a new wallet inside the worklet.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] if the worklet is not started, or
    /// a [`WdkError::Transport`] error from the call.
    pub async fn generate_entropy_and_encrypt(
        &self,
        word_count: WordCount,
    ) -> WdkResult<EncryptedWalletMaterial> {
        let rpc = self.started_rpc()?;
        rpc.generate_entropy_and_encrypt(GenerateEntropyRequest {
            word_count: word_count.words(),
        })
        .await
        .map(EncryptedWalletMaterial::from)
        .map_err(|err| WdkError::transport("worklet", "generateEntropyAndEncrypt", err))
    }

    /// Decrypts `encrypted_entropy` into its mnemonic.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] if the worklet is not started, or
    /// a [`WdkError::Transport`] error from the call.
    pub async fn get_mnemonic_from_entropy(
        &self,
        encrypted_entropy: &SecretString,
        encryption_key: &SecretString,
    ) -> WdkResult<SecretString> {
        let rpc = self.started_rpc()?;
        let mut response = rpc
            .get_mnemonic_from_entropy(MnemonicFromEntropyRequest {
                encrypted_entropy: encrypted_entropy.expose_secret().to_owned(),
                encryption_key: encryption_key.expose_secret().to_owned(),
            })
            .await
            .map_err(|err| WdkError::transport("worklet", "getMnemonicFromEntropy", err))?;
        Ok(SecretString::from(std::mem::take(&mut response.mnemonic)))
    }

    /// Derives encrypted seed and entropy from `mnemonic`.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] if the worklet is not started, or
    /// a [`WdkError::Transport`] error from the call.
    pub async fn get_seed_and_entropy_from_mnemonic(
        &self,
        mnemonic: &SecretString,
    ) -> WdkResult<EncryptedWalletMaterial> {
        let rpc = self.started_rpc()?;
        rpc.get_seed_and_entropy_from_mnemonic(SeedFromMnemonicRequest {
            mnemonic: mnemonic.expose_secret().to_owned(),
        })
        .await
        .map(EncryptedWalletMaterial::from)
        .map_err(|err| WdkError::transport("worklet", "getSeedAndEntropyFromMnemonic", err))
    }

    /// Calls an account-scoped worklet method and returns its JSON result.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] unless the WDK is initialized,
    /// [`WdkError::Superseded`] if another wallet was initialized or the
    /// lifecycle was reset while the call was in flight, or a
    /// [`WdkError::Transport`] error from the call.
    pub async fn call_method(&self, request: CallMethodRequest) -> WdkResult<String> {
        let (rpc, epoch) = {
            let state = self.state();
            if !state.is_initialized {
                return Err(WdkError::NotInitialized("wdk not initialized".to_string()));
            }
            let rpc = state
                .rpc
                .clone()
                .ok_or_else(|| WdkError::NotInitialized("worklet not started".to_string()))?;
            (rpc, state.wallet_epoch)
        };
        let operation = request.method_name.clone();
        let result = rpc.call_method(request).await;
        if self.wallet_epoch() != epoch {
            tracing::debug!(operation = %operation, "wallet changed during call");
            return Err(WdkError::Superseded { target: operation });
        }
        result
            .map(|response| response.result)
            .map_err(|err| WdkError::transport("worklet", &operation, err))
    }

    /// Drops the initialized wallet but keeps the worklet running.
    ///
    /// An initialization in flight when this runs commits nothing and
    /// returns [`WdkError::Superseded`].
    pub fn reset(&self) {
        let mut state = self.state();
        state.is_initialized = false;
        state.active_credentials = None;
        state.wdk_init_status = None;
        state.wallet_epoch += 1;
        tracing::debug!("lifecycle reset");
    }

    /// Tears the worklet down completely and returns to idle.
    ///
    /// A start or initialization in flight when this runs commits nothing.
    pub async fn shutdown(&self) {
        let (rpc, runtime) = {
            let mut state = self.state();
            let previous = std::mem::take(&mut *state);
            state.wallet_epoch = previous.wallet_epoch + 1;
            state.runtime_epoch = previous.runtime_epoch + 1;
            (previous.rpc, previous.runtime)
        };
        self.settled.notify_waiters();
        close_quietly(rpc, runtime).await;
        tracing::info!("worklet shut down");
    }

    /// Fails unless the worklet has been started.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::NotInitialized`] if it has not.
    pub fn ensure_worklet_started(&self) -> WdkResult<()> {
        if self.state().is_started {
            Ok(())
        } else {
            Err(WdkError::NotInitialized("worklet not started".to_string()))
        }
    }

    /// Forgets the last error.
    pub fn clear_error(&self) {
        self.state().error = None;
    }

    /// A copy of the non-secret state.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.state();
        LifecycleSnapshot {
            is_started: state.is_started,
            is_initialized: state.is_initialized,
            is_loading: state.is_loading,
            error: state.error.clone(),
            network_config: state
                .network_config
                .as_ref()
                .and_then(|config| config.to_json().ok()),
            worklet_start_status: state.worklet_start_status.clone(),
            wdk_init_status: state.wdk_init_status.clone(),
        }
    }

    /// Whether the worklet is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state().is_started
    }

    /// Changes whenever the wallet loaded in the worklet may have changed.
    #[must_use]
    pub fn wallet_epoch(&self) -> u64 {
        self.state().wallet_epoch
    }

    /// Whether a wallet is initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state().is_initialized
    }

    /// Whether the worklet is initialized with exactly `credentials`.
    #[must_use]
    pub fn is_initialized_with(&self, credentials: &WalletCredentials) -> bool {
        let state = self.state();
        state.is_initialized
            && state
                .active_credentials
                .as_ref()
                .is_some_and(|active| active.matches(credentials))
    }

    /// The configuration last used to start the worklet, or restored from a
    /// snapshot.
    #[must_use]
    pub fn network_config(&self) -> Option<WdkConfig> {
        self.state().network_config.clone()
    }

    /// Handshake results as `(worklet_start_status, wdk_init_status)`.
    #[must_use]
    pub fn handshake_statuses(&self) -> (Option<String>, Option<String>) {
        let state = self.state();
        (
            state.worklet_start_status.clone(),
            state.wdk_init_status.clone(),
        )
    }

    /// Restores non-secret state from a previous process.
    ///
    /// Ignored while a worklet is running or starting. Flags and handles stay
    /// empty.
    pub fn restore_config(
        &self,
        network_config: Option<WdkConfig>,
        worklet_start_status: Option<String>,
        wdk_init_status: Option<String>,
    ) {
        let mut state = self.state();
        if state.is_started || state.is_loading {
            tracing::warn!("ignoring restored config while the worklet is running");
            return;
        }
        state.network_config = network_config;
        state.worklet_start_status = worklet_start_status;
        state.wdk_init_status = wdk_init_status;
    }

    fn started_rpc(&self) -> WdkResult<Arc<dyn WorkletRpc>> {
        let state = self.state();
        match (&state.rpc, state.is_started) {
            (Some(rpc), true) => Ok(Arc::clone(rpc)),
            _ => Err(WdkError::NotInitialized("worklet not started".to_string())),
        }
    }

    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_loading` if the owning future is dropped before it settles.
struct LoadingGuard<'a> {
    lifecycle: &'a WorkletLifecycle,
    armed: bool,
}

impl<'a> LoadingGuard<'a> {
    const fn new(lifecycle: &'a WorkletLifecycle) -> Self {
        Self {
            lifecycle,
            armed: true,
        }
    }

    fn settle(mut self) {
        self.armed = false;
        self.lifecycle.settled.notify_waiters();
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.lifecycle.state().is_loading = false;
            self.lifecycle.settled.notify_waiters();
        }
    }
}

async fn close_quietly(
    rpc: Option<Arc<dyn WorkletRpc>>,
    runtime: Option<Arc<dyn WorkletRuntime>>,
) {
    if let Some(rpc) = rpc {
        if let Err(err) = rpc.close().await {
            tracing::warn!(error = %err, "failed to close worklet rpc");
        }
    }
    if let Some(runtime) = runtime {
        if let Err(err) = runtime.close().await {
            tracing::warn!(error = %err, "failed to close worklet runtime");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::NetworkConfig;
    use crate::credentials::duplicate_secret;
    use crate::memory::LoopbackWorklet;

    fn config(chain_id: u64) -> WdkConfig {
        WdkConfig::new()
            .with_network("ethereum", NetworkConfig::new(chain_id, "https://eth.example"))
            .unwrap()
    }

    fn lifecycle(worklet: &Arc<LoopbackWorklet>) -> Arc<WorkletLifecycle> {
        Arc::new(WorkletLifecycle::new(
            Arc::clone(worklet) as Arc<dyn WorkletHost>,
            WorkletBundle::new("wdk.bundle", vec![0u8; 4]),
        ))
    }

    fn provisioned(worklet: &LoopbackWorklet, name: &str) -> WalletCredentials {
        let material = worklet.material_for(name);
        WalletCredentials::new(material.encryption_key, material.encrypted_seed)
    }

    #[tokio::test]
    async fn test_start_commits_handles_and_config() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);

        let outcome = lifecycle.start_worklet(config(1)).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        let snapshot = lifecycle.snapshot();
        assert!(snapshot.is_started);
        assert!(!snapshot.is_loading);
        assert!(!snapshot.is_initialized);
        assert_eq!(snapshot.worklet_start_status.as_deref(), Some("started"));
        assert_eq!(lifecycle.network_config(), Some(config(1)));

        assert_eq!(
            lifecycle.start_worklet(config(2)).await.unwrap(),
            StartOutcome::AlreadyStarted
        );
        assert_eq!(worklet.runtimes_spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_start_builds_one_runtime() {
        let worklet = Arc::new(LoopbackWorklet::new().with_latency(Duration::from_millis(50)));
        let lifecycle = lifecycle(&worklet);

        let first = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.start_worklet(config(1)).await })
        };
        tokio::task::yield_now().await;
        assert!(lifecycle.snapshot().is_loading);

        let second = lifecycle.start_worklet(config(1)).await.unwrap();
        assert_eq!(second, StartOutcome::InProgress);

        lifecycle.wait_until_started().await.unwrap();
        assert_eq!(first.await.unwrap().unwrap(), StartOutcome::Started);
        assert_eq!(worklet.runtimes_spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_start_leaves_no_runtime_open() {
        let worklet = Arc::new(LoopbackWorklet::new().with_latency(Duration::from_millis(10)));
        let lifecycle = lifecycle(&worklet);

        // Dropped after the runtime was spawned but before it started.
        let timed_out =
            tokio::time::timeout(Duration::from_millis(15), lifecycle.start_worklet(config(1)))
                .await;
        assert!(timed_out.is_err());
        assert_eq!(worklet.runtimes_spawned(), 1);
        assert!(!lifecycle.snapshot().is_loading);

        // The next start tears the orphan down before building its own.
        lifecycle.start_worklet(config(1)).await.unwrap();
        assert_eq!(worklet.closed_runtimes(), 1);

        lifecycle.shutdown().await;
        assert_eq!(worklet.runtimes_spawned(), 2);
        assert_eq!(worklet.closed_runtimes(), 2);
        assert_eq!(worklet.closed_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_start_closes_parked_handles() {
        let worklet = Arc::new(LoopbackWorklet::new().with_latency(Duration::from_millis(10)));
        let lifecycle = lifecycle(&worklet);

        let (result, ()) = tokio::join!(lifecycle.start_worklet(config(1)), async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            lifecycle.shutdown().await;
        });
        assert_eq!(
            result,
            Err(WdkError::Superseded {
                target: START_KEY.to_string()
            })
        );
        let snapshot = lifecycle.snapshot();
        assert!(!snapshot.is_started);
        assert!(!snapshot.is_loading);
        assert_eq!(worklet.runtimes_spawned(), 1);
        assert_eq!(worklet.closed_runtimes(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_reverts_to_idle() {
        let worklet = Arc::new(LoopbackWorklet::new());
        worklet.fail_next("workletStart", "bad config");
        let lifecycle = lifecycle(&worklet);

        let err = lifecycle.start_worklet(config(1)).await.unwrap_err();
        assert!(matches!(
            err,
            WdkError::Transport { ref operation, .. } if operation == "workletStart"
        ));
        let snapshot = lifecycle.snapshot();
        assert!(!snapshot.is_started);
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.unwrap().contains("bad config"));
        assert!(lifecycle.network_config().is_none());
        assert_eq!(worklet.closed_runtimes(), 1);
        assert!(lifecycle.wait_until_started().await.is_err());

        // A retry clears the previous error and succeeds.
        lifecycle.start_worklet(config(1)).await.unwrap();
        assert!(lifecycle.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_initialize_requires_started_worklet() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        let creds = provisioned(&worklet, "alice");

        let err = lifecycle.initialize_wdk(creds).await.unwrap_err();
        assert!(matches!(err, WdkError::NotInitialized(_)));
        assert_eq!(worklet.initialize_calls(), 0);
        assert!(lifecycle.ensure_worklet_started().is_err());
    }

    #[tokio::test]
    async fn test_initialize_twice_with_same_credentials_calls_once() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let creds = provisioned(&worklet, "alice");

        assert_eq!(
            lifecycle.initialize_wdk(creds.duplicate()).await.unwrap(),
            InitOutcome::Initialized
        );
        assert_eq!(
            lifecycle.initialize_wdk(creds.duplicate()).await.unwrap(),
            InitOutcome::AlreadyInitialized
        );
        assert_eq!(worklet.initialize_calls(), 1);
        assert!(lifecycle.is_initialized_with(&creds));
    }

    #[tokio::test]
    async fn test_concurrent_identical_initialize_calls_once() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let creds = provisioned(&worklet, "alice");

        let (a, b) = tokio::join!(
            lifecycle.initialize_wdk(creds.duplicate()),
            lifecycle.initialize_wdk(creds.duplicate())
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|outcome| *outcome == InitOutcome::AlreadyInitialized);
        assert_eq!(
            outcomes,
            vec![InitOutcome::Initialized, InitOutcome::AlreadyInitialized]
        );
        assert_eq!(worklet.initialize_calls(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_keeps_worklet_running() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let alice = provisioned(&worklet, "alice");
        lifecycle.initialize_wdk(alice.duplicate()).await.unwrap();

        // Bob's key paired with Alice's seed cannot decrypt it.
        let bob = provisioned(&worklet, "bob");
        let mismatched = WalletCredentials::new(
            duplicate_secret(bob.encryption_key()),
            duplicate_secret(alice.encrypted_seed()),
        );
        let err = lifecycle.initialize_wdk(mismatched).await.unwrap_err();
        assert!(matches!(err, WdkError::DecryptionMismatch(_)));

        let snapshot = lifecycle.snapshot();
        assert!(snapshot.is_started);
        assert!(!snapshot.is_initialized);
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.is_some());
        assert!(!lifecycle.is_initialized_with(&alice));
        // The running config is still the one used at start.
        assert_eq!(lifecycle.network_config(), Some(config(1)));
        assert_eq!(worklet.runtimes_spawned(), 1);

        // A successful retry clears the stale error.
        lifecycle.initialize_wdk(alice).await.unwrap();
        assert!(lifecycle.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_reset_keeps_worklet_and_shutdown_tears_down() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let creds = provisioned(&worklet, "alice");
        lifecycle.initialize_wdk(creds.duplicate()).await.unwrap();

        lifecycle.reset();
        assert!(lifecycle.is_started());
        assert!(!lifecycle.is_initialized());
        assert_eq!(worklet.closed_runtimes(), 0);

        // Same credentials initialize again after a reset.
        lifecycle.initialize_wdk(creds).await.unwrap();
        assert_eq!(worklet.initialize_calls(), 2);

        lifecycle.shutdown().await;
        let snapshot = lifecycle.snapshot();
        assert!(!snapshot.is_started);
        assert!(!snapshot.is_initialized);
        assert!(snapshot.network_config.is_none());
        assert!(snapshot.worklet_start_status.is_none());
        assert_eq!(worklet.closed_runtimes(), 1);
        assert_eq!(worklet.closed_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_initialize_commits_nothing() {
        let worklet = Arc::new(LoopbackWorklet::new().with_latency(Duration::from_millis(10)));
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let creds = provisioned(&worklet, "alice");

        let (result, ()) = tokio::join!(lifecycle.initialize_wdk(creds.duplicate()), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            lifecycle.reset();
        });
        assert_eq!(
            result,
            Err(WdkError::Superseded {
                target: INITIALIZE_KEY.to_string()
            })
        );
        assert!(!lifecycle.is_initialized());
        assert!(!lifecycle.snapshot().is_loading);
        assert!(lifecycle.snapshot().wdk_init_status.is_none());

        // Nothing was recorded, so the same credentials initialize for real.
        assert_eq!(
            lifecycle.initialize_wdk(creds).await.unwrap(),
            InitOutcome::Initialized
        );
        assert_eq!(worklet.initialize_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_method_answer_from_before_reset_is_dropped() {
        let worklet = Arc::new(LoopbackWorklet::new().with_latency(Duration::from_millis(10)));
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        lifecycle
            .initialize_wdk(provisioned(&worklet, "alice"))
            .await
            .unwrap();
        let request = CallMethodRequest {
            method_name: "getAddress".to_string(),
            network: "ethereum".to_string(),
            account_index: 0,
            args: None,
        };

        let (result, ()) = tokio::join!(lifecycle.call_method(request), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            lifecycle.reset();
        });
        assert_eq!(
            result,
            Err(WdkError::Superseded {
                target: "getAddress".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_entropy_operations_require_start_only() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        assert!(lifecycle
            .generate_entropy_and_encrypt(WordCount::Twelve)
            .await
            .is_err());

        lifecycle.start_worklet(config(1)).await.unwrap();
        let material = lifecycle
            .generate_entropy_and_encrypt(WordCount::Twelve)
            .await
            .unwrap();
        let mnemonic = lifecycle
            .get_mnemonic_from_entropy(&material.encrypted_entropy, &material.encryption_key)
            .await
            .unwrap();
        assert_eq!(mnemonic.expose_secret().split_whitespace().count(), 12);

        let derived = lifecycle
            .get_seed_and_entropy_from_mnemonic(&mnemonic)
            .await
            .unwrap();
        assert_eq!(
            derived.encrypted_seed.expose_secret(),
            material.encrypted_seed.expose_secret()
        );
        assert!(!lifecycle.is_initialized());
    }

    #[tokio::test]
    async fn test_call_method_requires_initialization() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.start_worklet(config(1)).await.unwrap();
        let request = CallMethodRequest {
            method_name: "getAddress".to_string(),
            network: "ethereum".to_string(),
            account_index: 0,
            args: None,
        };
        assert!(matches!(
            lifecycle.call_method(request.clone()).await,
            Err(WdkError::NotInitialized(_))
        ));

        lifecycle
            .initialize_wdk(provisioned(&worklet, "alice"))
            .await
            .unwrap();
        let result = lifecycle.call_method(request).await.unwrap();
        assert!(result.starts_with("\"0x"));
    }

    #[tokio::test]
    async fn test_restore_config_is_ignored_while_running() {
        let worklet = Arc::new(LoopbackWorklet::new());
        let lifecycle = lifecycle(&worklet);
        lifecycle.restore_config(Some(config(5)), Some("started".to_string()), None);
        assert_eq!(lifecycle.network_config(), Some(config(5)));
        assert!(!lifecycle.is_started());

        lifecycle.start_worklet(config(1)).await.unwrap();
        lifecycle.restore_config(Some(config(9)), None, None);
        assert_eq!(lifecycle.network_config(), Some(config(1)));
    }
}
