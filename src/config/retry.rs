use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whole-operation deadline (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the random extra delay, as a fraction of the computed delay
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.timeout_ms must be greater than 0"
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.jitter_ratio must be within [0, 1], got {}",
                self.jitter_ratio
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by concern
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Lock contention and version conflicts inside `execute_atomic`
    #[serde(default = "default_atomic_policy")]
    pub atomic: BackoffPolicy,

    /// Event persistence inside the per-game drain loop
    #[serde(default = "default_event_persist_policy")]
    pub event_persist: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            atomic: default_atomic_policy(),
            event_persist: default_event_persist_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.atomic.validate("atomic")?;
        self.event_persist.validate("event_persist")?;
        Ok(())
    }
}

fn default_atomic_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 10_000,
        base_delay_ms: 100,
        max_delay_ms: 5_000,
        jitter_ratio: 0.1,
    }
}

fn default_event_persist_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 5_000,
        base_delay_ms: 10,
        max_delay_ms: 200,
        jitter_ratio: 0.1,
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_op_timeout_ms() -> u64 {
    10_000
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_jitter_ratio() -> f64 {
    0.1
}
