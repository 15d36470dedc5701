use crate::config::WdkConfig;
use crate::credentials::WalletCredentials;
use crate::error::{WdkError, WdkResult};
use crate::validation::validate_wallet_id;
use crate::wallet_state::WalletLoadingState;

use super::{switch_key, AttemptGuard, WdkOrchestrator};

/// Options for [`WdkOrchestrator::switch_to_wallet`] and the provisioning
/// flows.
#[derive(Debug, Clone, Default)]
pub struct SwitchOptions {
    /// Configuration to start the worklet with if it is not running yet.
    ///
    /// Without it the last known configuration is used, and failing that the
    /// worklet must already have been started.
    pub start_config: Option<WdkConfig>,
}

/// Result of [`WdkOrchestrator::switch_to_wallet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SwitchOutcome {
    /// The wallet is now active.
    Switched,
    /// It already was; nothing was called.
    AlreadyActive,
    /// A concurrent switch initialized another wallet after this one did,
    /// or a reset ran while this one was loading. Nothing was committed.
    Superseded,
}

impl WdkOrchestrator {
    /// Makes `wallet_id` the active wallet.
    ///
    /// Runs under the `switchToWallet:<id>` mutex key. Cached credentials skip
    /// the vault entirely; otherwise the seed and then the key are read, the
    /// key read being the one that prompts for biometrics. Switching away from
    /// a wallet leaves its cached credentials in place.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Validation`] for a malformed id, before anything else.
    /// - [`WdkError::WalletNotFound`] if the vault has no such wallet.
    /// - [`WdkError::Authentication`] if the biometric prompt fails.
    /// - Any lifecycle error from starting or initializing.
    ///
    /// On failure the active wallet is unchanged and the loading state reports
    /// the error, unless a newer attempt already replaced it.
    pub async fn switch_to_wallet(
        &self,
        wallet_id: &str,
        options: SwitchOptions,
    ) -> WdkResult<SwitchOutcome> {
        validate_wallet_id(wallet_id)?;
        self.operations
            .with_mutex(&switch_key(wallet_id), || {
                self.switch_serialized(wallet_id, options)
            })
            .await
    }

    async fn switch_serialized(
        &self,
        wallet_id: &str,
        options: SwitchOptions,
    ) -> WdkResult<SwitchOutcome> {
        let already_active = self.selection.active_wallet_id().as_deref() == Some(wallet_id)
            && self.lifecycle.is_initialized();
        if already_active {
            tracing::debug!(wallet_id, "wallet already active");
            return Ok(SwitchOutcome::AlreadyActive);
        }

        let guard = AttemptGuard::begin(
            &self.selection,
            WalletLoadingState::Loading {
                identifier: wallet_id.to_string(),
            },
        );
        tracing::info!(wallet_id, "switching wallet");

        match self.activate(wallet_id, options).await {
            Ok(credentials) => {
                // Another switch may have initialized its wallet while this
                // one was resuming.
                if !self.lifecycle.is_initialized_with(&credentials) {
                    tracing::warn!(wallet_id, "switch superseded");
                    guard.roll_back();
                    return Ok(SwitchOutcome::Superseded);
                }
                if !guard.commit(wallet_id) {
                    tracing::warn!(wallet_id, "switch superseded by a reset");
                    return Ok(SwitchOutcome::Superseded);
                }
                tracing::info!(wallet_id, "wallet active");
                Ok(SwitchOutcome::Switched)
            }
            Err(WdkError::Superseded { .. }) => {
                tracing::warn!(wallet_id, "switch superseded by a reset");
                guard.roll_back();
                Ok(SwitchOutcome::Superseded)
            }
            Err(err) => {
                let message = err.user_message();
                self.selection.fail(guard.attempt(), wallet_id, message.clone());
                guard.disarm();
                tracing::warn!(wallet_id, error = %message, "wallet switch failed");
                Err(err)
            }
        }
    }

    async fn activate(
        &self,
        wallet_id: &str,
        options: SwitchOptions,
    ) -> WdkResult<WalletCredentials> {
        if !self.vault.has_wallet(wallet_id).await? {
            return Err(WdkError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            });
        }
        self.ensure_started(options.start_config).await?;
        let credentials = self.resolve_credentials(wallet_id).await?;
        self.lifecycle
            .initialize_wdk(credentials.duplicate())
            .await?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::{NetworkConfig, OrchestratorConfig, WorkletBundle};
    use crate::memory::{LoopbackWorklet, MemoryVault};
    use crate::transport::WorkletHost;
    use crate::vault::SecureVault;

    fn options() -> SwitchOptions {
        SwitchOptions {
            start_config: Some(
                WdkConfig::new()
                    .with_network("ethereum", NetworkConfig::new(1, "https://eth.example"))
                    .unwrap(),
            ),
        }
    }

    fn setup(vault: MemoryVault) -> (Arc<MemoryVault>, Arc<LoopbackWorklet>, WdkOrchestrator) {
        let vault = Arc::new(vault);
        let worklet = Arc::new(LoopbackWorklet::new());
        for name in ["alice", "bob"] {
            vault.insert_wallet(name, &worklet.material_for(name));
        }
        let orchestrator = WdkOrchestrator::new(
            OrchestratorConfig::new(WorkletBundle::new("wdk.bundle", vec![1u8])),
            Arc::clone(&vault) as Arc<dyn SecureVault>,
            Arc::clone(&worklet) as Arc<dyn WorkletHost>,
        );
        (vault, worklet, orchestrator)
    }

    #[tokio::test]
    async fn test_switch_commits_pointer_and_ready_state() {
        let (_vault, worklet, orchestrator) = setup(MemoryVault::new());
        let outcome = orchestrator
            .switch_to_wallet("alice", options())
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        assert_eq!(orchestrator.active_wallet_id().as_deref(), Some("alice"));
        assert_eq!(
            orchestrator.loading_state(),
            WalletLoadingState::Ready {
                identifier: "alice".to_string()
            }
        );
        assert_eq!(worklet.initialize_calls(), 1);
        assert!(!orchestrator.operations.is_held(&switch_key("alice")));
    }

    #[tokio::test]
    async fn test_switch_after_reset_initializes_again() {
        let (vault, worklet, orchestrator) = setup(MemoryVault::new());
        orchestrator.switch_to_wallet("alice", options()).await.unwrap();
        orchestrator.reset();

        let outcome = orchestrator
            .switch_to_wallet("alice", SwitchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        assert_eq!(worklet.initialize_calls(), 2);
        // Served from the credential cache.
        assert_eq!(vault.biometric_prompts(), 1);
    }

    #[tokio::test]
    async fn test_denied_biometrics_surface_unwrapped() {
        let (vault, _worklet, orchestrator) = setup(MemoryVault::new());
        vault.deny_biometrics(true);
        let err = orchestrator
            .switch_to_wallet("alice", options())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WdkError::Authentication("User canceled authentication".to_string())
        );
        assert!(matches!(
            orchestrator.loading_state(),
            WalletLoadingState::Error { ref identifier, .. } if identifier == "alice"
        ));
        assert_eq!(orchestrator.active_wallet_id(), None);
    }

    #[tokio::test]
    async fn test_invalid_id_fails_before_any_call() {
        let (vault, worklet, orchestrator) = setup(MemoryVault::new());
        let err = orchestrator
            .switch_to_wallet("not a wallet", options())
            .await
            .unwrap_err();
        assert!(matches!(err, WdkError::Validation { .. }));
        assert_eq!(vault.call_count(), 0);
        assert_eq!(worklet.runtimes_spawned(), 0);
        assert_eq!(orchestrator.loading_state(), WalletLoadingState::NotLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_reset_during_switch_is_not_undone() {
        let (_vault, worklet, orchestrator) = setup(MemoryVault::new());
        orchestrator.switch_to_wallet("alice", options()).await.unwrap();
        worklet.set_latency(Duration::from_millis(10));

        let (outcome, ()) = tokio::join!(orchestrator.switch_to_wallet("bob", options()), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            orchestrator.hard_reset();
        });
        assert_eq!(outcome.unwrap(), SwitchOutcome::Superseded);
        assert_eq!(orchestrator.active_wallet_id(), None);
        assert_eq!(orchestrator.loading_state(), WalletLoadingState::NotLoaded);
        assert!(!orchestrator.snapshot().is_initialized);
        assert!(!orchestrator.snapshot().is_loading);
        assert_eq!(worklet.initialize_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_switch_restores_previous_state() {
        let (_vault, _worklet, orchestrator) =
            setup(MemoryVault::new().with_latency(Duration::from_millis(20)));
        orchestrator.switch_to_wallet("alice", options()).await.unwrap();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(5),
            orchestrator.switch_to_wallet("bob", options()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(orchestrator.active_wallet_id().as_deref(), Some("alice"));
        assert_eq!(
            orchestrator.loading_state(),
            WalletLoadingState::Ready {
                identifier: "alice".to_string()
            }
        );
        assert!(!orchestrator.operations.is_held(&switch_key("bob")));
    }
}
