//! Configuration for stakingd

use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use staking_core::{LedgerConfig, MachineId, StakeError};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Ledger owner, min-stake, penalty and monitors
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    /// Mount the custody mint/approve routes. Always on with `accept_all` identities.
    #[serde(default)]
    pub dev_custody: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8095)),
            dev_custody: false,
        }
    }
}

/// How stake proofs are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Hex Ed25519 key and signature over the canonical stake message
    #[default]
    Ed25519,
    /// Every proof passes. Local development only.
    AcceptAll,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub mode: IdentityMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryMode {
    #[default]
    Open,
    AllowList,
}

/// Project registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub mode: RegistryMode,

    /// Eligible machines when `mode = allow_list`
    #[serde(default)]
    pub machines: Vec<String>,
}

impl RegistryConfig {
    pub fn machine_ids(&self) -> Result<Vec<MachineId>, StakeError> {
        self.machines.iter().map(|m| MachineId::new(m.clone())).collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Layer defaults, an optional file and `STAKING__*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `STAKING__LEDGER__OWNER`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Values stay strings so 18-decimal amounts never pass through a float.
        builder = builder.add_source(
            config::Environment::with_prefix("STAKING")
                .prefix_separator("__")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn development() -> Self {
        Self {
            identity: IdentityConfig {
                mode: IdentityMode::AcceptAll,
            },
            ..Default::default()
        }
    }
}
