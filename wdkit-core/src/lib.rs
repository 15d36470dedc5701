#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session and credential orchestration for an isolated wallet worklet.
//!
//! [`WdkOrchestrator`] owns the worklet lifecycle, the credential cache, the
//! active wallet pointer and the per-wallet address and balance store. The
//! secure vault and the worklet runtime are injected as traits.

use strum::EnumString;

/// Which preset network map [`DefaultConfig`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Production networks.
    Mainnet,
    /// Public test networks.
    Testnet,
}

pub mod abort;
pub use abort::{AbortController, AbortSignal};

mod accounts;
pub use accounts::AccountService;

pub mod config;
pub use config::{NetworkConfig, OrchestratorConfig, WdkConfig, WorkletBundle};

mod credential_cache;
pub use credential_cache::{CachedCredentials, CredentialCache, CredentialUpdate};

mod credentials;
pub use credentials::WalletCredentials;

/// Tuning constants and preset network configurations.
pub mod defaults;
pub use defaults::DefaultConfig;

mod error;
pub use error::*;

pub mod ffi;
pub use ffi::{ForeignError, ForeignVault, ForeignWorklet, ForeignWorkletHost, WdkSession};

pub mod lifecycle;
pub use lifecycle::{InitOutcome, LifecycleSnapshot, StartOutcome, WorkletLifecycle};

/// Logging bridge to a foreign logger.
pub mod logger;

mod mutex;
pub use mutex::OperationMutex;

mod orchestrator;
pub use orchestrator::{RestoreOptions, RestoreOutcome, SwitchOptions, SwitchOutcome, WdkOrchestrator};

pub mod persistence;
pub use persistence::{PersistedSession, SnapshotStore};

mod sanitize;
pub use sanitize::*;

pub mod store;

pub mod transport;

pub mod validation;
pub use validation::WordCount;

pub mod vault;
pub use vault::SecureVault;

mod wallet_state;
pub use wallet_state::{WalletLoadingState, WalletSelection};

#[cfg(any(test, feature = "memory"))]
pub mod memory;

uniffi::setup_scaffolding!("wdkit_core");
