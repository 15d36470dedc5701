#![cfg(feature = "memory")]

//! Common test utilities shared across integration tests.

use std::sync::Arc;
use std::time::Duration;

use wdkit_core::memory::{LoopbackWorklet, MemoryVault};
use wdkit_core::{
    NetworkConfig, OrchestratorConfig, SecureVault, SwitchOptions, WdkConfig, WdkOrchestrator,
    WorkletBundle,
};

/// An orchestrator wired to an in-memory vault and a loopback worklet.
pub struct Harness {
    /// Vault the orchestrator reads credentials from.
    pub vault: Arc<MemoryVault>,
    /// Worklet host the orchestrator spawns runtimes on.
    pub worklet: Arc<LoopbackWorklet>,
    /// The orchestrator under test.
    pub orchestrator: Arc<WdkOrchestrator>,
}

impl Harness {
    /// A harness with no latency and no wallets.
    pub fn new() -> Self {
        Self::with(MemoryVault::new(), LoopbackWorklet::new())
    }

    /// A harness around the given collaborators, with a one minute
    /// credential TTL.
    pub fn with(vault: MemoryVault, worklet: LoopbackWorklet) -> Self {
        init_tracing();
        let vault = Arc::new(vault);
        let worklet = Arc::new(worklet);
        let orchestrator = Arc::new(WdkOrchestrator::new(
            OrchestratorConfig::new(WorkletBundle::new("wdk.bundle", vec![0x57, 0x44, 0x4b]))
                .with_credential_ttl(Duration::from_secs(60)),
            Arc::clone(&vault) as Arc<dyn SecureVault>,
            Arc::clone(&worklet) as Arc<dyn wdkit_core::transport::WorkletHost>,
        ));
        Self {
            vault,
            worklet,
            orchestrator,
        }
    }

    /// Stores the loopback material for each name in the vault.
    pub fn provision(&self, names: &[&str]) {
        for name in names {
            self.vault
                .insert_wallet(name, &self.worklet.material_for(name));
        }
    }
}

/// Ethereum and Polygon, both valid.
pub fn config() -> WdkConfig {
    WdkConfig::new()
        .with_network("ethereum", NetworkConfig::new(1, "https://eth.example"))
        .and_then(|config| {
            config.with_network("polygon", NetworkConfig::new(137, "https://polygon.example"))
        })
        .expect("valid config")
}

/// Switch options that start the worklet with [`config`].
pub fn start_options() -> SwitchOptions {
    SwitchOptions {
        start_config: Some(config()),
    }
}

/// Routes `tracing` output to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
