use std::time::Duration;

use crate::config::{NetworkConfig, WdkConfig};
use crate::error::WdkResult;
use crate::Environment;

/// How long resolved credentials stay in the credential cache.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of wallets with cached credentials.
pub const DEFAULT_CREDENTIAL_CACHE_CAPACITY: usize = 15;

/// Identity used for address/balance caching before any wallet is selected.
pub const TEMPORARY_WALLET_ID: &str = "__temporary__";

/// Version tag written into persisted session snapshots.
pub const SESSION_SNAPSHOT_VERSION: u32 = 1;

/// Preset configurations per [`Environment`].
pub trait DefaultConfig {
    /// Builds the preset configuration for `environment`, optionally pointing
    /// every network at `provider_override`.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Validation`](crate::WdkError::Validation) if a
    /// preset network name is rejected.
    fn from_environment(
        environment: &Environment,
        provider_override: Option<String>,
    ) -> WdkResult<Self>
    where
        Self: Sized;
}

impl DefaultConfig for WdkConfig {
    fn from_environment(
        environment: &Environment,
        provider_override: Option<String>,
    ) -> WdkResult<Self> {
        let presets: &[(&str, u64, &str)] = match environment {
            Environment::Mainnet => &[
                ("ethereum", 1, "https://eth.drpc.org"),
                ("polygon", 137, "https://polygon.drpc.org"),
                ("arbitrum", 42_161, "https://arbitrum.drpc.org"),
            ],
            Environment::Testnet => &[
                ("sepolia", 11_155_111, "https://sepolia.drpc.org"),
                ("amoy", 80_002, "https://polygon-amoy.drpc.org"),
            ],
        };

        presets
            .iter()
            .try_fold(Self::new(), |config, (name, chain_id, provider)| {
                let provider = provider_override
                    .clone()
                    .unwrap_or_else(|| (*provider).to_string());
                config.with_network(*name, NetworkConfig::new(*chain_id, provider))
            })
    }
}
