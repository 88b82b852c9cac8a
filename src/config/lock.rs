use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Per-game lease parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockConfig {
    /// Lease duration applied when the caller does not pass one
    #[serde(default = "default_lock_ttl_ms")]
    pub default_ttl_ms: u64,

    /// How often locally tracked, expired leases are dropped
    #[serde(default = "default_lock_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_lock_ttl_ms(),
            sweep_interval_ms: default_lock_sweep_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lock.default_ttl_ms must be greater than 0".into(),
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lock.sweep_interval_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_lock_ttl_ms() -> u64 {
    30_000
}
fn default_lock_sweep_interval_ms() -> u64 {
    60_000
}
