//! Configuration management
//!
//! Layered: built-in defaults, then an optional `observer-call.toml`, then
//! environment variables such as `OBSERVER_CALL__CALL__RING_TIMEOUT_SECS`.

use ::config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "observer-call.toml";
pub const ENV_PREFIX: &str = "OBSERVER_CALL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub call: CallConfig,
    pub signaling: SignalingConfig,
    pub relay: RelayConfig,
    pub devices: DevicesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    pub ring_timeout_secs: u64,
    pub reconnect_timeout_secs: u64,
    pub teardown_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Relay base URL; the user id is appended as the last path segment
    pub url: String,
    pub user_id: String,
    pub send_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Behaviour of the simulated capture devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub camera_available: bool,
    pub microphone_available: bool,
    pub permission_granted: bool,
    pub acquire_latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call: CallConfig::default(),
            signaling: SignalingConfig {
                url: "ws://127.0.0.1:8090/signaling".to_string(),
                user_id: "1".to_string(),
                send_timeout_ms: 5000,
                reconnect_backoff_ms: 500,
                max_backoff_ms: 30_000,
            },
            relay: RelayConfig {
                enabled: true,
                host: "0.0.0.0".to_string(),
                port: 8090,
            },
            devices: DevicesConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 60,
            reconnect_timeout_secs: 30,
            teardown_grace_ms: 3000,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            camera_available: true,
            microphone_available: true,
            permission_granted: true,
            acquire_latency_ms: 50,
        }
    }
}

impl Config {
    /// Load from `observer-call.toml` in the working directory (if present)
    /// and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let defaults = ::config::Config::try_from(&Config::default())?;

        let config: Config = ::config::Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call.ring_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "call.ring_timeout_secs must be positive".to_string(),
            ));
        }
        if self.signaling.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("signaling.user_id is empty".to_string()));
        }
        if self.signaling.reconnect_backoff_ms > self.signaling.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "signaling.reconnect_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, e.g. to seed a config file
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
