use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::registry::RegistryAddresses;

pub const DEFAULT_RPC_URL: &str = "https://evm-tst3.exsat.network";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub registries: RegistryAddresses,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Endpoint for the read-only execution context.
    pub rpc_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Bound on waiting for the wallet to sign and broadcast.
    pub submission_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            submission_timeout_ms: 120_000,
            confirmation_timeout_ms: 120_000,
            poll_interval_ms: 1_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl TrackerConfig {
    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("network.rpc_url must not be empty")]
    EmptyRpcUrl,

    #[error("relationship and task registries share address {0}")]
    RegistryCollision(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(ConfigError::EmptyRpcUrl);
        }
        for (field, value) in [
            ("tracker.submission_timeout_ms", self.tracker.submission_timeout_ms),
            ("tracker.confirmation_timeout_ms", self.tracker.confirmation_timeout_ms),
            ("tracker.poll_interval_ms", self.tracker.poll_interval_ms),
            ("tracker.read_timeout_ms", self.tracker.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if self.registries.relationship == self.registries.task {
            return Err(ConfigError::RegistryCollision(
                self.registries.task.to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.network.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.tracker.confirmation_timeout(), Duration::from_secs(120));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"tracker": {"poll_interval_ms": 250}}"#).expect("parse");
        assert_eq!(config.tracker.poll_interval_ms, 250);
        assert_eq!(config.tracker.confirmation_timeout_ms, 120_000);
        assert_eq!(config.tracker.submission_timeout_ms, 120_000);
        assert_eq!(config.registries, RegistryAddresses::default());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        config.tracker.confirmation_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "tracker.confirmation_timeout_ms"
            })
        );
    }

    #[test]
    fn zero_submission_timeout_is_rejected() {
        let mut config = Config::default();
        config.tracker.submission_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "tracker.submission_timeout_ms"
            })
        );
    }

    #[test]
    fn shared_registry_address_is_rejected() {
        let mut config = Config::default();
        config.registries.task = config.registries.relationship;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RegistryCollision(_))
        ));
    }
}
