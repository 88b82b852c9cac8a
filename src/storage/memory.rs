use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::Clock;
use crate::Result;
use crate::SystemClock;
use crate::VersionedStore;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    /// Epoch milliseconds; `None` never expires
    expires_at: Option<u64>,
}

impl StoredValue {
    fn is_live(
        &self,
        now: u64,
    ) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store adapter
///
/// Expiry is evaluated lazily on access against the injected clock;
/// `purge_expired` reclaims memory for keys nobody reads again.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn deadline(
        &self,
        ttl: Duration,
    ) -> u64 {
        self.clock.now_ms().saturating_add(ttl.as_millis() as u64)
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, v| v.is_live(now));
        let removed = before - data.len();
        trace!(removed, "MemoryStore purge_expired");
        removed
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.data.read().values().filter(|v| v.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_ms();
        let data = self.data.read();
        Ok(data.get(key).filter(|v| v.is_live(now)).map(|v| v.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires_at = ttl.map(|ttl| self.deadline(ttl));
        self.data.write().insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let now = self.clock.now_ms();
        Ok(self.data.write().remove(key).is_some_and(|v| v.is_live(now)))
    }

    async fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        let now = self.clock.now_ms();
        Ok(self.data.read().get(key).is_some_and(|v| v.is_live(now)))
    }

    async fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = self.clock.now_ms();
        let deadline = self.deadline(ttl);
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(v) if v.is_live(now) => {
                v.expires_at = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
