//! The orchestration engine: one owned service object tying the vault, the
//! worklet lifecycle, the credential cache and the wallet selection together.
//!
//! Every wallet-mutating flow runs under an [`OperationMutex`] key derived
//! from the wallet id, so two flows on the same wallet never interleave.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use secrecy::SecretString;

use crate::accounts::AccountService;
use crate::config::{OrchestratorConfig, WdkConfig};
use crate::credential_cache::{CredentialCache, CredentialUpdate};
use crate::credentials::{duplicate_secret, WalletCredentials};
use crate::defaults::SESSION_SNAPSHOT_VERSION;
use crate::error::{WdkError, WdkResult};
use crate::lifecycle::{InitOutcome, LifecycleSnapshot, StartOutcome, WorkletLifecycle};
use crate::mutex::OperationMutex;
use crate::persistence::{PersistedSession, SnapshotStore, SESSION_SNAPSHOT_KEY};
use crate::store::{AddressState, BalanceState, NetworkAddresses, NetworkBalances, WalletDataStore};
use crate::transport::WorkletHost;
use crate::vault::SecureVault;
use crate::wallet_state::{WalletLoadingState, WalletSelection};

mod provision;
mod restore;
mod switch;

pub use restore::{RestoreOptions, RestoreOutcome};
pub use switch::{SwitchOptions, SwitchOutcome};

fn switch_key(wallet_id: &str) -> String {
    format!("switchToWallet:{wallet_id}")
}

/// Owns every piece of session state. Construct one per process, or one per
/// test.
pub struct WdkOrchestrator {
    vault: Arc<dyn SecureVault>,
    lifecycle: Arc<WorkletLifecycle>,
    cache: CredentialCache,
    operations: OperationMutex,
    selection: Arc<WalletSelection>,
    store: Arc<WalletDataStore>,
    accounts: AccountService,
    restore_generation: AtomicU64,
}

impl std::fmt::Debug for WdkOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WdkOrchestrator")
            .field("lifecycle", &self.lifecycle)
            .field("selection", &self.selection)
            .field("cached_wallets", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl WdkOrchestrator {
    /// Creates an orchestrator with an idle worklet and empty caches.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        vault: Arc<dyn SecureVault>,
        host: Arc<dyn WorkletHost>,
    ) -> Self {
        let lifecycle = Arc::new(WorkletLifecycle::new(host, config.bundle));
        let selection = Arc::new(WalletSelection::default());
        let store = Arc::new(WalletDataStore::new());
        let accounts = AccountService::new(
            Arc::clone(&lifecycle),
            Arc::clone(&selection),
            Arc::clone(&store),
        );
        Self {
            vault,
            lifecycle,
            cache: CredentialCache::new(config.credential_ttl, config.credential_cache_capacity),
            operations: OperationMutex::new(),
            selection,
            store,
            accounts,
            restore_generation: AtomicU64::new(0),
        }
    }

    /// Starts the worklet. See [`WorkletLifecycle::start_worklet`].
    ///
    /// # Errors
    ///
    /// Returns the boot failure.
    pub async fn start_worklet(&self, config: WdkConfig) -> WdkResult<StartOutcome> {
        self.lifecycle.start_worklet(config).await
    }

    /// Initializes the worklet with explicit credentials, bypassing the
    /// vault and the wallet selection.
    ///
    /// # Errors
    ///
    /// See [`WorkletLifecycle::initialize_wdk`].
    pub async fn initialize_wdk(&self, credentials: WalletCredentials) -> WdkResult<InitOutcome> {
        self.lifecycle.initialize_wdk(credentials).await
    }

    /// Drops the initialized wallet and every cached address. The worklet
    /// keeps running.
    pub fn reset(&self) {
        self.lifecycle.reset();
        self.store.clear_addresses();
    }

    /// Forgets the last lifecycle error.
    pub fn clear_error(&self) {
        self.lifecycle.clear_error();
    }

    /// Tears down the worklet and forgets every wallet, credential and cached
    /// value.
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
        self.cache.clear(None);
        self.store.clear_all();
        self.selection.reset();
    }

    /// A copy of the non-secret lifecycle state.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.lifecycle.snapshot()
    }

    /// The active wallet id.
    #[must_use]
    pub fn active_wallet_id(&self) -> Option<String> {
        self.selection.active_wallet_id()
    }

    /// The wallet loading state.
    #[must_use]
    pub fn loading_state(&self) -> WalletLoadingState {
        self.selection.loading_state()
    }

    /// Every cached address, keyed by wallet id.
    #[must_use]
    pub fn addresses(&self) -> AddressState {
        self.store.addresses()
    }

    /// Every cached balance, keyed by wallet id.
    #[must_use]
    pub fn balances(&self) -> BalanceState {
        self.store.balances()
    }

    /// Cached addresses of one wallet.
    #[must_use]
    pub fn wallet_addresses(&self, wallet_id: &str) -> Option<NetworkAddresses> {
        self.store.wallet_addresses(wallet_id)
    }

    /// Cached balances of one wallet.
    #[must_use]
    pub fn wallet_balances(&self, wallet_id: &str) -> Option<NetworkBalances> {
        self.store.wallet_balances(wallet_id)
    }

    /// Address, balance and generic account calls.
    #[must_use]
    pub const fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    /// The underlying lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<WorkletLifecycle> {
        &self.lifecycle
    }

    /// Writes the non-secret session to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Persistence`] if encoding or the write fails.
    pub fn persist(&self, store: &dyn SnapshotStore) -> WdkResult<()> {
        let (worklet_start_status, wdk_init_status) = self.lifecycle.handshake_statuses();
        let session = PersistedSession {
            version: SESSION_SNAPSHOT_VERSION,
            network_config: self.lifecycle.network_config(),
            worklet_start_status,
            wdk_init_status,
            last_active_wallet_id: self.selection.active_wallet_id(),
        };
        store.write_atomic(SESSION_SNAPSHOT_KEY.to_string(), session.to_bytes()?)
    }

    /// Restores the configuration and handshake results written by
    /// [`persist`](Self::persist) and returns the last active wallet id.
    ///
    /// Lifecycle flags and handles stay empty; follow up with
    /// [`restore_wallet`](Self::restore_wallet) to bring the wallet back.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Persistence`] if the read fails or the snapshot is
    /// malformed.
    pub fn rehydrate(&self, store: &dyn SnapshotStore) -> WdkResult<Option<String>> {
        let Some(bytes) = store.read(SESSION_SNAPSHOT_KEY.to_string())? else {
            return Ok(None);
        };
        let session = PersistedSession::from_bytes(&bytes)?;
        self.lifecycle.restore_config(
            session.network_config,
            session.worklet_start_status,
            session.wdk_init_status,
        );
        tracing::info!(
            last_active_wallet_id = ?session.last_active_wallet_id,
            "session rehydrated"
        );
        Ok(session.last_active_wallet_id)
    }

    /// Starts the worklet with `start_config`, else with the last known
    /// configuration, else requires that someone else started it.
    async fn ensure_started(&self, start_config: Option<WdkConfig>) -> WdkResult<()> {
        if self.lifecycle.is_started() {
            return Ok(());
        }
        match start_config.or_else(|| self.lifecycle.network_config()) {
            Some(config) => match self.lifecycle.start_worklet(config).await? {
                StartOutcome::InProgress => self.lifecycle.wait_until_started().await,
                StartOutcome::Started | StartOutcome::AlreadyStarted => Ok(()),
            },
            None => self.lifecycle.ensure_worklet_started(),
        }
    }

    /// Key and seed for `wallet_id`, from the cache when both are there.
    ///
    /// On a miss the seed is read first; only the key read prompts for
    /// biometrics.
    async fn resolve_credentials(&self, wallet_id: &str) -> WdkResult<WalletCredentials> {
        let cached = self.cache.get(wallet_id);
        if let Some(credentials) = cached.as_ref().and_then(|entry| entry.credentials()) {
            tracing::debug!(wallet_id, "credentials served from cache");
            return Ok(credentials);
        }

        let encrypted_seed = match cached.as_ref().and_then(|entry| entry.encrypted_seed.as_ref()) {
            Some(seed) => duplicate_secret(seed),
            None => self
                .vault
                .get_encrypted_seed(wallet_id)
                .await?
                .ok_or_else(|| missing(wallet_id, "encryptedSeed"))?,
        };
        let encryption_key = match cached.as_ref().and_then(|entry| entry.encryption_key.as_ref()) {
            Some(key) => duplicate_secret(key),
            None => self
                .vault
                .get_encryption_key(wallet_id)
                .await?
                .ok_or_else(|| missing(wallet_id, "encryptionKey"))?,
        };

        let credentials = WalletCredentials::new(encryption_key, encrypted_seed);
        self.cache
            .set(wallet_id, CredentialUpdate::from_credentials(&credentials));
        Ok(credentials)
    }

    /// Encryption key and encrypted entropy for `wallet_id`, cache first.
    async fn resolve_entropy(&self, wallet_id: &str) -> WdkResult<(SecretString, SecretString)> {
        let cached = self.cache.get(wallet_id);
        let encryption_key = match cached.as_ref().and_then(|entry| entry.encryption_key.as_ref()) {
            Some(key) => duplicate_secret(key),
            None => self
                .vault
                .get_encryption_key(wallet_id)
                .await?
                .ok_or_else(|| missing(wallet_id, "encryptionKey"))?,
        };
        let encrypted_entropy =
            match cached.as_ref().and_then(|entry| entry.encrypted_entropy.as_ref()) {
                Some(entropy) => duplicate_secret(entropy),
                None => self
                    .vault
                    .get_encrypted_entropy(wallet_id)
                    .await?
                    .ok_or_else(|| missing(wallet_id, "encryptedEntropy"))?,
            };
        self.cache.set(
            wallet_id,
            CredentialUpdate::default()
                .encryption_key(duplicate_secret(&encryption_key))
                .encrypted_entropy(duplicate_secret(&encrypted_entropy)),
        );
        Ok((encryption_key, encrypted_entropy))
    }
}

fn missing(wallet_id: &str, field: &str) -> WdkError {
    WdkError::MissingCredential {
        wallet_id: wallet_id.to_string(),
        field: field.to_string(),
    }
}

/// Puts the wallet selection back the way an attempt found it, unless the
/// attempt settled or a newer one took over.
struct AttemptGuard<'a> {
    selection: &'a WalletSelection,
    attempt: u64,
    reset_epoch: u64,
    previous_active: Option<String>,
    previous_loading: WalletLoadingState,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn begin(selection: &'a WalletSelection, state: WalletLoadingState) -> Self {
        let reset_epoch = selection.reset_epoch();
        let previous_active = selection.active_wallet_id();
        let previous_loading = selection.loading_state();
        let attempt = selection.begin(state);
        Self {
            selection,
            attempt,
            reset_epoch,
            previous_active,
            previous_loading,
            armed: true,
        }
    }

    const fn attempt(&self) -> u64 {
        self.attempt
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Makes `wallet_id` active unless a reset ran since the attempt began.
    fn commit(mut self, wallet_id: &str) -> bool {
        self.armed = false;
        self.selection.commit(self.reset_epoch, wallet_id)
    }

    fn roll_back(mut self) {
        self.armed = false;
        self.selection.restore(
            self.attempt,
            self.previous_active.take(),
            self.previous_loading.clone(),
        );
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.selection.restore(
                self.attempt,
                self.previous_active.take(),
                self.previous_loading.clone(),
            );
        }
    }
}
