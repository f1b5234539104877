//! Client configuration loaded from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Remote service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Upper bound on a single service lookup.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Period of the background proxy health check. `0` disables it.
    #[serde(default)]
    pub health_check_interval_ms: u64,
}

impl ServiceConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_ms > 0)
            .then(|| Duration::from_millis(self.health_check_interval_ms))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout_ms(),
            health_check_interval_ms: 0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_load_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}
