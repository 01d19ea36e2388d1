//! Runtime configuration shared by clients and the manager.
//!
//! Loaded from an optional YAML file and `TXGROUP__*` environment variables.

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "txgroup.yaml";
/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "TXGROUP_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TXGROUP";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Identity of this service, sent with joins and recorded in the participant map.
    pub service_id: String,
    /// Address recorded for this service in the participant map.
    pub address: String,
    /// Upper bound on one manager round trip.
    pub rpc_timeout_ms: u64,
    /// Allowed lifetime of a group before notify is refused and the watchdog reclaims it.
    pub dtx_time_ms: u64,
    /// Delay before a join is verified against the manager.
    pub delay_check_ms: u64,
    /// Manager watchdog tick.
    pub watchdog_interval_ms: u64,
    /// Capacity of the manager command channel.
    pub channel_buffer: usize,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            service_id: "txgroup-service".to_string(),
            address: "127.0.0.1:0".to_string(),
            rpc_timeout_ms: 3_000,
            dtx_time_ms: 36_000,
            delay_check_ms: 2_000,
            watchdog_interval_ms: 1_000,
            channel_buffer: 64,
        }
    }
}

impl TxConfig {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `txgroup.yaml` in the working directory (if present)
    /// 2. `path` (if given)
    /// 3. the file named by `TXGROUP_CONFIG` (if set)
    /// 4. `TXGROUP__<FIELD>` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the manager and messengers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("dtx_time_ms", self.dtx_time_ms),
            ("watchdog_interval_ms", self.watchdog_interval_ms),
            ("channel_buffer", u64::try_from(self.channel_buffer).unwrap_or(u64::MAX)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Config for a named service with defaults everywhere else.
    pub fn for_service(service_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn dtx_time(&self) -> Duration {
        Duration::from_millis(self.dtx_time_ms)
    }

    pub fn delay_check(&self) -> Duration {
        Duration::from_millis(self.delay_check_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TxConfig::default();
        assert_eq!(config.rpc_timeout(), Duration::from_secs(3));
        assert_eq!(config.dtx_time(), Duration::from_secs(36));
        assert_eq!(config.channel_buffer, 64);
    }

    #[test]
    fn test_for_service_keeps_defaults() {
        let config = TxConfig::for_service("order", "10.0.0.1:8080");
        assert_eq!(config.service_id, "order");
        assert_eq!(config.delay_check_ms, TxConfig::default().delay_check_ms);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let path = std::env::temp_dir().join(format!("txgroup-{}.yaml", std::process::id()));
        std::fs::write(&path, "service_id: inventory\ndelay_check_ms: 10\n").unwrap();

        let config = TxConfig::load(path.to_str()).unwrap();
        assert_eq!(config.service_id, "inventory");
        assert_eq!(config.delay_check_ms, 10);
        assert_eq!(config.rpc_timeout_ms, 3_000);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_zero_values_are_rejected() {
        assert!(TxConfig::default().validate().is_ok());

        let no_buffer = TxConfig {
            channel_buffer: 0,
            ..TxConfig::default()
        };
        assert!(matches!(
            no_buffer.validate(),
            Err(ConfigError::Invalid {
                field: "channel_buffer",
                ..
            })
        ));

        let no_tick = TxConfig {
            watchdog_interval_ms: 0,
            ..TxConfig::default()
        };
        assert!(matches!(
            no_tick.validate(),
            Err(ConfigError::Invalid {
                field: "watchdog_interval_ms",
                ..
            })
        ));

        let no_timeout = TxConfig {
            rpc_timeout_ms: 0,
            ..TxConfig::default()
        };
        assert!(matches!(
            no_timeout.validate(),
            Err(ConfigError::Invalid {
                field: "rpc_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_load_rejects_zero_buffer_from_file() {
        let path =
            std::env::temp_dir().join(format!("txgroup-zero-{}.yaml", std::process::id()));
        std::fs::write(&path, "channel_buffer: 0\n").unwrap();

        let loaded = TxConfig::load(path.to_str());
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            loaded,
            Err(ConfigError::Invalid {
                field: "channel_buffer",
                ..
            })
        ));
    }
}
