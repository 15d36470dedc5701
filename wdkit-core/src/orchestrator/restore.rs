use std::future::Future;
use std::sync::atomic::Ordering;

use crate::abort::AbortSignal;
use crate::config::WdkConfig;
use crate::error::{WdkError, WdkResult};
use crate::validation::validate_wallet_id;
use crate::wallet_state::WalletLoadingState;

use super::{AttemptGuard, WdkOrchestrator};

const RESTORE_OPERATION: &str = "restoreWallet";

/// Options for [`WdkOrchestrator::restore_wallet`].
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Configuration to start the worklet with if it is not running yet.
    pub start_config: Option<WdkConfig>,
    /// Raced against every await; firing it stops the flow at once.
    pub abort: Option<AbortSignal>,
}

/// Result of [`WdkOrchestrator::restore_wallet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum RestoreOutcome {
    /// The wallet is active.
    Restored,
    /// A newer restore or switch took over; nothing was committed.
    Superseded,
    /// The vault has no wallet under this id.
    NoWallet,
}

impl WdkOrchestrator {
    /// Brings back the wallet used in a previous session.
    ///
    /// Walks the loading state through `Checking`, `Loading` and `Ready`.
    /// Unlike [`switch_to_wallet`](Self::switch_to_wallet) this flow takes no
    /// mutex; instead every call takes a fresh generation number, and a run
    /// that finds a newer generation after any await stops without touching
    /// state.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Cancelled`] if `options.abort` fired. The wallet state is
    ///   put back the way this call found it.
    /// - Any vault or lifecycle failure, reported in the loading state.
    pub async fn restore_wallet(
        &self,
        wallet_id: &str,
        options: RestoreOptions,
    ) -> WdkResult<RestoreOutcome> {
        validate_wallet_id(wallet_id)?;
        let generation = self.restore_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = AttemptGuard::begin(&self.selection, WalletLoadingState::Checking);
        let run = RestoreRun {
            orchestrator: self,
            generation,
            abort: options.abort,
        };

        match run.steps(wallet_id, guard.attempt(), options.start_config).await {
            Ok(RestoreOutcome::Restored) => {
                guard.disarm();
                tracing::info!(wallet_id, "wallet restored");
                Ok(RestoreOutcome::Restored)
            }
            Ok(RestoreOutcome::NoWallet) => {
                self.selection
                    .advance(guard.attempt(), WalletLoadingState::NotLoaded);
                guard.disarm();
                tracing::info!(wallet_id, "no wallet to restore");
                Ok(RestoreOutcome::NoWallet)
            }
            Ok(RestoreOutcome::Superseded) | Err(WdkError::Superseded { .. }) => {
                guard.disarm();
                tracing::debug!(wallet_id, generation, "restore superseded");
                Ok(RestoreOutcome::Superseded)
            }
            Err(err @ WdkError::Cancelled { .. }) => {
                guard.roll_back();
                tracing::info!(wallet_id, "restore cancelled");
                Err(err)
            }
            Err(err) => {
                let message = err.user_message();
                self.selection.fail(guard.attempt(), wallet_id, message.clone());
                guard.disarm();
                tracing::warn!(wallet_id, error = %message, "wallet restore failed");
                Err(err)
            }
        }
    }

    /// Cold recovery: drops the initialized wallet and forgets the selection.
    /// The worklet keeps running and cached credentials stay.
    pub fn hard_reset(&self) {
        self.restore_generation.fetch_add(1, Ordering::SeqCst);
        self.reset();
        self.selection.reset();
        tracing::info!("hard reset");
    }
}

struct RestoreRun<'a> {
    orchestrator: &'a WdkOrchestrator,
    generation: u64,
    abort: Option<AbortSignal>,
}

impl RestoreRun<'_> {
    fn checkpoint(&self, wallet_id: &str) -> WdkResult<()> {
        if let Some(abort) = &self.abort {
            abort.check(RESTORE_OPERATION)?;
        }
        if self.orchestrator.restore_generation.load(Ordering::SeqCst) != self.generation {
            return Err(WdkError::Superseded {
                target: wallet_id.to_string(),
            });
        }
        Ok(())
    }

    /// Awaits `step` unless the abort signal fires first, then makes sure no
    /// newer restore took over.
    async fn step<T, F>(&self, wallet_id: &str, step: F) -> WdkResult<T>
    where
        F: Future<Output = WdkResult<T>>,
    {
        let value = match &self.abort {
            Some(abort) => abort.race(RESTORE_OPERATION, step).await?,
            None => step.await?,
        };
        self.checkpoint(wallet_id)?;
        Ok(value)
    }

    async fn steps(
        &self,
        wallet_id: &str,
        attempt: u64,
        start_config: Option<WdkConfig>,
    ) -> WdkResult<RestoreOutcome> {
        let orchestrator = self.orchestrator;
        self.checkpoint(wallet_id)?;

        let exists = self
            .step(wallet_id, async {
                orchestrator
                    .vault
                    .has_wallet(wallet_id)
                    .await
                    .map_err(WdkError::from)
            })
            .await?;
        if !exists {
            return Ok(RestoreOutcome::NoWallet);
        }
        let loading = WalletLoadingState::Loading {
            identifier: wallet_id.to_string(),
        };
        if !orchestrator.selection.advance(attempt, loading) {
            return Ok(RestoreOutcome::Superseded);
        }

        self.step(wallet_id, orchestrator.ensure_started(start_config))
            .await?;
        let credentials = self
            .step(wallet_id, orchestrator.resolve_credentials(wallet_id))
            .await?;
        self.step(
            wallet_id,
            orchestrator.lifecycle.initialize_wdk(credentials.duplicate()),
        )
        .await?;

        if orchestrator.lifecycle.is_initialized_with(&credentials)
            && orchestrator.selection.commit_if_current(attempt, wallet_id)
        {
            Ok(RestoreOutcome::Restored)
        } else {
            Ok(RestoreOutcome::Superseded)
        }
    }
}
