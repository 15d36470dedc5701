use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{OrchestratorConfig, WdkConfig, WorkletBundle};
use crate::error::WdkResult;
use crate::lifecycle::{LifecycleSnapshot, StartOutcome};
use crate::orchestrator::{
    RestoreOptions, RestoreOutcome, SwitchOptions, SwitchOutcome, WdkOrchestrator,
};
use crate::validation::WordCount;
use crate::wallet_state::WalletLoadingState;

use super::vault::VaultBridge;
use super::worklet::WorkletBridge;
use super::{ForeignVault, ForeignWorkletHost};

fn switch_options(config: Option<String>) -> WdkResult<SwitchOptions> {
    Ok(SwitchOptions {
        start_config: config.as_deref().map(WdkConfig::from_json).transpose()?,
    })
}

/// A [`WdkOrchestrator`] driven from Swift or Kotlin.
///
/// Configurations cross the boundary as the JSON accepted by
/// [`WdkConfig::from_json`].
#[derive(Debug, uniffi::Object)]
pub struct WdkSession(WdkOrchestrator);

#[uniffi::export(async_runtime = "tokio")]
impl WdkSession {
    /// Creates a session with an idle worklet and empty caches.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        bundle_path: String,
        bundle: Vec<u8>,
        vault: Arc<dyn ForeignVault>,
        host: Arc<dyn ForeignWorkletHost>,
    ) -> Arc<Self> {
        let config = OrchestratorConfig::new(WorkletBundle::new(bundle_path, bundle));
        Arc::new(Self(WdkOrchestrator::new(
            config,
            Arc::new(VaultBridge(vault)),
            Arc::new(WorkletBridge(host)),
        )))
    }

    /// Starts the worklet with the JSON network configuration `config`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad JSON, otherwise the boot failure.
    pub async fn start_worklet(&self, config: &str) -> WdkResult<StartOutcome> {
        let config = WdkConfig::from_json(config)?;
        self.0.start_worklet(config).await
    }

    /// See [`WdkOrchestrator::switch_to_wallet`].
    ///
    /// # Errors
    ///
    /// As the orchestrator call, plus a validation error for bad JSON.
    pub async fn switch_to_wallet(
        &self,
        wallet_id: &str,
        config: Option<String>,
    ) -> WdkResult<SwitchOutcome> {
        let options = switch_options(config)?;
        self.0.switch_to_wallet(wallet_id, options).await
    }

    /// See [`WdkOrchestrator::restore_wallet`]. Cannot be aborted from here.
    ///
    /// # Errors
    ///
    /// As the orchestrator call, plus a validation error for bad JSON.
    pub async fn restore_wallet(
        &self,
        wallet_id: &str,
        config: Option<String>,
    ) -> WdkResult<RestoreOutcome> {
        let options = RestoreOptions {
            start_config: switch_options(config)?.start_config,
            abort: None,
        };
        self.0.restore_wallet(wallet_id, options).await
    }

    /// See [`WdkOrchestrator::create_wallet`].
    ///
    /// # Errors
    ///
    /// As the orchestrator call, plus a validation error for bad JSON.
    pub async fn create_wallet(
        &self,
        wallet_id: &str,
        word_count: WordCount,
        config: Option<String>,
    ) -> WdkResult<()> {
        let options = switch_options(config)?;
        self.0.create_wallet(wallet_id, word_count, options).await
    }

    /// See [`WdkOrchestrator::import_wallet`].
    ///
    /// # Errors
    ///
    /// As the orchestrator call, plus a validation error for bad JSON.
    pub async fn import_wallet(
        &self,
        wallet_id: &str,
        mnemonic: String,
        config: Option<String>,
    ) -> WdkResult<()> {
        let mnemonic = SecretString::from(mnemonic);
        let options = switch_options(config)?;
        self.0.import_wallet(wallet_id, mnemonic, options).await
    }

    /// See [`WdkOrchestrator::reveal_mnemonic`].
    ///
    /// # Errors
    ///
    /// As the orchestrator call.
    pub async fn reveal_mnemonic(&self, wallet_id: &str) -> WdkResult<String> {
        let mnemonic = self.0.reveal_mnemonic(wallet_id).await?;
        Ok(mnemonic.expose_secret().to_owned())
    }

    /// See [`WdkOrchestrator::delete_wallet`].
    ///
    /// # Errors
    ///
    /// As the orchestrator call.
    pub async fn delete_wallet(&self, wallet_id: &str) -> WdkResult<()> {
        self.0.delete_wallet(wallet_id).await
    }

    /// See [`AccountService::address`](crate::AccountService::address).
    ///
    /// # Errors
    ///
    /// As the account call.
    pub async fn address(
        &self,
        network: &str,
        account_index: u32,
        wallet_id: Option<String>,
    ) -> WdkResult<String> {
        self.0
            .accounts()
            .address(network, account_index, wallet_id.as_deref())
            .await
    }

    /// See [`AccountService::balance`](crate::AccountService::balance).
    ///
    /// # Errors
    ///
    /// As the account call.
    pub async fn balance(
        &self,
        network: &str,
        account_index: u32,
        asset_id: &str,
        wallet_id: Option<String>,
    ) -> WdkResult<String> {
        self.0
            .accounts()
            .balance(network, account_index, asset_id, wallet_id.as_deref())
            .await
    }

    /// Drops the initialized wallet and every cached address.
    pub fn reset(&self) {
        self.0.reset();
    }

    /// Drops the initialized wallet and forgets the selection. Cached
    /// credentials stay.
    pub fn hard_reset(&self) {
        self.0.hard_reset();
    }

    /// Clears the lifecycle error.
    pub fn clear_error(&self) {
        self.0.clear_error();
    }

    /// Tears down the worklet and forgets every wallet, credential and cached
    /// value.
    pub async fn shutdown(&self) {
        self.0.shutdown().await;
    }

    /// Current lifecycle flags.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.0.snapshot()
    }

    /// The wallet currently loaded, if any.
    #[must_use]
    pub fn active_wallet_id(&self) -> Option<String> {
        self.0.active_wallet_id()
    }

    /// Where the latest wallet attempt stands.
    #[must_use]
    pub fn loading_state(&self) -> WalletLoadingState {
        self.0.loading_state()
    }
}
