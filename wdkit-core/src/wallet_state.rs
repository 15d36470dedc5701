//! Active wallet pointer and its loading state.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where the wallet selection currently stands.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum WalletLoadingState {
    /// No wallet selected.
    NotLoaded,
    /// Looking up whether a wallet exists at all.
    Checking,
    /// Fetching credentials and initializing the worklet.
    Loading {
        /// Wallet being loaded.
        identifier: String,
    },
    /// The wallet is initialized and active.
    Ready {
        /// The active wallet.
        identifier: String,
    },
    /// The last attempt failed.
    Error {
        /// Wallet the attempt was for.
        identifier: String,
        /// Sanitized failure message.
        error: String,
    },
}

impl WalletLoadingState {
    /// The wallet this state refers to, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::NotLoaded | Self::Checking => None,
            Self::Loading { identifier }
            | Self::Ready { identifier }
            | Self::Error { identifier, .. } => Some(identifier),
        }
    }
}

#[derive(Debug)]
struct Selection {
    active_wallet_id: Option<String>,
    loading: WalletLoadingState,
    /// Bumped on every transition so a stale attempt can tell it lost.
    attempt: u64,
    /// Bumped by [`WalletSelection::reset`] only.
    resets: u64,
}

/// The active wallet id together with its loading state.
///
/// Every transition returns or checks an attempt number, so an attempt can
/// only overwrite the state it set itself.
#[derive(Debug)]
pub struct WalletSelection {
    inner: Mutex<Selection>,
}

impl Default for WalletSelection {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Selection {
                active_wallet_id: None,
                loading: WalletLoadingState::NotLoaded,
                attempt: 0,
                resets: 0,
            }),
        }
    }
}

impl WalletSelection {
    /// The active wallet id.
    #[must_use]
    pub fn active_wallet_id(&self) -> Option<String> {
        self.lock().active_wallet_id.clone()
    }

    /// The current loading state.
    #[must_use]
    pub fn loading_state(&self) -> WalletLoadingState {
        self.lock().loading.clone()
    }

    /// Moves to `state` and returns the attempt number that owns it.
    pub(crate) fn begin(&self, state: WalletLoadingState) -> u64 {
        let mut inner = self.lock();
        inner.attempt += 1;
        inner.loading = state;
        inner.attempt
    }

    /// Moves to `state` if `attempt` still owns the selection.
    pub(crate) fn advance(&self, attempt: u64, state: WalletLoadingState) -> bool {
        let mut inner = self.lock();
        if inner.attempt != attempt {
            return false;
        }
        inner.loading = state;
        true
    }

    /// Number of resets so far. Pass it to [`commit`](Self::commit).
    pub(crate) fn reset_epoch(&self) -> u64 {
        self.lock().resets
    }

    /// Sets the active wallet and marks it ready in one step.
    ///
    /// Applies over newer attempts, since the worklet now holds this wallet,
    /// but never over a reset that happened after `reset_epoch` was read.
    pub(crate) fn commit(&self, reset_epoch: u64, wallet_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.resets != reset_epoch {
            return false;
        }
        inner.attempt += 1;
        inner.active_wallet_id = Some(wallet_id.to_string());
        inner.loading = WalletLoadingState::Ready {
            identifier: wallet_id.to_string(),
        };
        true
    }

    /// Commits `wallet_id` only if `attempt` still owns the selection.
    pub(crate) fn commit_if_current(&self, attempt: u64, wallet_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.attempt != attempt {
            return false;
        }
        inner.active_wallet_id = Some(wallet_id.to_string());
        inner.loading = WalletLoadingState::Ready {
            identifier: wallet_id.to_string(),
        };
        true
    }

    /// Records a failure for `wallet_id` unless a newer attempt took over.
    pub(crate) fn fail(&self, attempt: u64, wallet_id: &str, error: String) -> bool {
        self.advance(
            attempt,
            WalletLoadingState::Error {
                identifier: wallet_id.to_string(),
                error,
            },
        )
    }

    /// Puts back `active` and `loading` if `attempt` still owns the selection.
    pub(crate) fn restore(
        &self,
        attempt: u64,
        active: Option<String>,
        loading: WalletLoadingState,
    ) -> bool {
        let mut inner = self.lock();
        if inner.attempt != attempt {
            return false;
        }
        inner.active_wallet_id = active;
        inner.loading = loading;
        true
    }

    /// Forgets the active wallet and returns to `NotLoaded`.
    pub(crate) fn reset(&self) {
        let mut inner = self.lock();
        inner.attempt += 1;
        inner.resets += 1;
        inner.active_wallet_id = None;
        inner.loading = WalletLoadingState::NotLoaded;
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
