//! Versioned key-value store port
//!
//! The engine treats the store as the single source of truth for locks, game
//! state and event history. Only single-key writes are assumed; there are no
//! transactions and no compare-and-set.
mod codec;
mod keys;
mod memory;

#[cfg(test)]
mod memory_test;

pub use codec::*;
pub use keys::*;
pub use memory::*;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionedStore: Send + Sync + 'static {
    /// Returns the value at `key`, or `None` if absent or expired
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Writes `value`; `ttl = None` keeps the key until deleted
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Returns whether a live key was removed
    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    async fn exists(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Resets the expiry of a live key; returns `false` if the key is absent
    async fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<bool>;
}

impl std::fmt::Debug for dyn VersionedStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str("VersionedStore")
    }
}
