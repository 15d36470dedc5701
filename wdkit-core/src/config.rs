//! Configuration handed to the worklet and to the orchestrator itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_CREDENTIAL_CACHE_CAPACITY, DEFAULT_CREDENTIAL_TTL};
use crate::error::{WdkError, WdkResult};
use crate::validation::validate_network;

/// Per-network settings forwarded to the worklet.
///
/// Fields the engine does not know about are preserved in `extra` and sent
/// back out unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// EVM chain id.
    pub chain_id: u64,
    /// JSON-RPC provider URL.
    pub provider: String,
    /// ERC-4337 bundler URL, if the network uses account abstraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundler_url: Option<String>,
    /// Paymaster URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_url: Option<String>,
    /// Pass-through settings.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NetworkConfig {
    /// Creates a network entry with only the required fields.
    pub fn new<S: Into<String>>(chain_id: u64, provider: S) -> Self {
        Self {
            chain_id,
            provider: provider.into(),
            bundler_url: None,
            paymaster_url: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// The configuration object used to start the worklet: network name to
/// network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WdkConfig {
    networks: BTreeMap<String, NetworkConfig>,
}

impl WdkConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            networks: BTreeMap::new(),
        }
    }

    /// Adds or replaces a network.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Validation`] if the network name is malformed.
    pub fn with_network<S: Into<String>>(
        mut self,
        name: S,
        network: NetworkConfig,
    ) -> WdkResult<Self> {
        let name = name.into();
        validate_network(&name)?;
        self.networks.insert(name, network);
        Ok(self)
    }

    /// Looks up a network by name.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.get(name)
    }

    /// Iterates over configured network names.
    pub fn network_names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Parses a configuration from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Validation`] if the JSON is malformed or a network
    /// name is invalid.
    pub fn from_json(json: &str) -> WdkResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| WdkError::validation("config", err.to_string()))?;
        for name in config.networks.keys() {
            validate_network(name)?;
        }
        Ok(config)
    }

    /// Serializes the configuration to the JSON string the worklet expects.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Validation`] if a pass-through value cannot be
    /// serialized.
    pub fn to_json(&self) -> WdkResult<String> {
        serde_json::to_string(self).map_err(|err| WdkError::validation("config", err.to_string()))
    }
}

/// The executable bundle loaded into a freshly constructed runtime.
#[derive(Clone)]
pub struct WorkletBundle {
    /// Path the runtime reports for the bundle (used in stack traces).
    pub path: String,
    /// Bundle bytes.
    pub bytes: Arc<[u8]>,
}

impl WorkletBundle {
    /// Creates a bundle descriptor.
    pub fn new<P: Into<String>, B: Into<Arc<[u8]>>>(path: P, bytes: B) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for WorkletBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkletBundle")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Settings for [`WdkOrchestrator`](crate::WdkOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bundle loaded on every worklet start.
    pub bundle: WorkletBundle,
    /// How long resolved credentials stay cached.
    pub credential_ttl: Duration,
    /// Maximum number of wallets with cached credentials.
    pub credential_cache_capacity: usize,
}

impl OrchestratorConfig {
    /// Creates a configuration with default cache settings.
    #[must_use]
    pub const fn new(bundle: WorkletBundle) -> Self {
        Self {
            bundle,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            credential_cache_capacity: DEFAULT_CREDENTIAL_CACHE_CAPACITY,
        }
    }

    /// Overrides the credential TTL.
    #[must_use]
    pub const fn with_credential_ttl(mut self, ttl: Duration) -> Self {
        self.credential_ttl = ttl;
        self
    }

    /// Overrides the credential cache bound.
    #[must_use]
    pub const fn with_credential_cache_capacity(mut self, capacity: usize) -> Self {
        self.credential_cache_capacity = capacity;
        self
    }
}
