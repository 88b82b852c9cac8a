use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Event history and subscription housekeeping
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventConfig {
    /// Events kept per game; oldest are trimmed past this cap
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// `get_event_history` limit when the caller passes none
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,

    /// TTL of individually persisted events and of the history list
    #[serde(default = "default_event_ttl_secs")]
    pub event_ttl_secs: u64,

    /// Subscriptions older than this are removed by the sweep
    #[serde(default = "default_subscription_stale_after_ms")]
    pub subscription_stale_after_ms: u64,

    #[serde(default = "default_subscription_sweep_interval_ms")]
    pub subscription_sweep_interval_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            default_history_limit: default_history_limit(),
            event_ttl_secs: default_event_ttl_secs(),
            subscription_stale_after_ms: default_subscription_stale_after_ms(),
            subscription_sweep_interval_ms: default_subscription_sweep_interval_ms(),
        }
    }
}

impl EventConfig {
    pub fn event_ttl(&self) -> Duration {
        Duration::from_secs(self.event_ttl_secs)
    }

    pub fn subscription_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.subscription_sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_cap == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event.history_cap must be greater than 0".into(),
            )));
        }
        if self.default_history_limit == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event.default_history_limit must be greater than 0".into(),
            )));
        }
        if self.event_ttl_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event.event_ttl_secs must be greater than 0".into(),
            )));
        }
        if self.subscription_stale_after_ms == 0 || self.subscription_sweep_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event subscription sweep settings must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_history_cap() -> usize {
    1000
}
fn default_history_limit() -> usize {
    100
}
fn default_event_ttl_secs() -> u64 {
    // 24 hours
    86_400
}
fn default_subscription_stale_after_ms() -> u64 {
    86_400_000
}
fn default_subscription_sweep_interval_ms() -> u64 {
    // 5 minutes
    300_000
}
