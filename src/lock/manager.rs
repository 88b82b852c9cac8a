use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nanoid::nanoid;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::get_json;
use crate::lock_key;
use crate::set_json;
use crate::Clock;
use crate::Error;
use crate::LockConfig;
use crate::LockError;
use crate::LockInfo;
use crate::LockLease;
use crate::Result;
use crate::VersionedStore;

/// Issues and releases per-game leases
///
/// Leases acquired through this instance are also tracked in a local
/// registry. The registry entry is reserved synchronously before the store
/// round-trip, so two tasks of the same process can never both hold a game.
/// Across processes the store offers no compare-and-set; `verify_fence`
/// narrows that window before state writes.
pub struct LockManager {
    store: Arc<dyn VersionedStore>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
    held: DashMap<String, LockInfo>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("held", &self.held.len())
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        clock: Arc<dyn Clock>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            held: DashMap::new(),
        }
    }

    /// Acquire the lease for `game_id`.
    ///
    /// Fails with [`LockError::Held`] (`PERMISSION_DENIED`) while another
    /// holder's lease is unexpired. `ttl = None` applies `lock.default_ttl_ms`.
    pub async fn acquire_lock(
        &self,
        game_id: &str,
        holder_id: &str,
        operation: &str,
        ttl: Option<Duration>,
    ) -> Result<LockInfo> {
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let now = self.clock.now_ms();
        let candidate = LockInfo {
            lock_id: nanoid!(),
            game_id: game_id.to_string(),
            holder_id: holder_id.to_string(),
            operation: operation.to_string(),
            acquired_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        };

        match self.held.entry(game_id.to_string()) {
            Entry::Occupied(mut e) => {
                if !e.get().is_expired_at(now) {
                    debug!(game_id, holder_id, current = %e.get().holder_id, "lock held locally");
                    return Err(held(e.get()));
                }
                e.insert(candidate.clone());
            }
            Entry::Vacant(e) => {
                e.insert(candidate.clone());
            }
        }

        let key = lock_key(game_id);
        let existing: Option<LockInfo> = match get_json(self.store.as_ref(), &key).await {
            Ok(v) => v,
            Err(e) => {
                self.forget(game_id, &candidate.lock_id);
                return Err(e);
            }
        };

        if let Some(existing) = existing {
            if !existing.is_expired_at(now) {
                self.forget(game_id, &candidate.lock_id);
                debug!(game_id, holder_id, current = %existing.holder_id, "lock held in store");
                return Err(held(&existing));
            }
        }

        if let Err(e) = set_json(self.store.as_ref(), &key, &candidate, Some(ttl)).await {
            self.forget(game_id, &candidate.lock_id);
            return Err(e);
        }

        trace!(game_id, holder_id, lock_id = %candidate.lock_id, "lock acquired");
        Ok(candidate)
    }

    /// Release a lease previously returned by [`acquire_lock`](Self::acquire_lock).
    ///
    /// Releasing a lease that no longer exists in the store succeeds.
    /// Releasing with a token other than the stored one fails with
    /// [`LockError::NotOwner`].
    pub async fn release_lock(
        &self,
        lock: &LockInfo,
    ) -> Result<()> {
        let key = lock_key(&lock.game_id);
        let stored: Option<LockInfo> = get_json(self.store.as_ref(), &key).await?;

        match stored {
            None => {
                self.forget(&lock.game_id, &lock.lock_id);
                trace!(game_id = %lock.game_id, "release of absent lock is a no-op");
                Ok(())
            }
            Some(current) if current.lock_id != lock.lock_id => {
                warn!(
                    game_id = %lock.game_id,
                    lock_id = %lock.lock_id,
                    current_lock_id = %current.lock_id,
                    "refusing to release a lock owned by another holder"
                );
                Err(LockError::NotOwner {
                    game_id: lock.game_id.clone(),
                    lock_id: lock.lock_id.clone(),
                    current_lock_id: current.lock_id,
                }
                .into())
            }
            Some(_) => {
                self.store.delete(&key).await?;
                self.forget(&lock.game_id, &lock.lock_id);
                trace!(game_id = %lock.game_id, lock_id = %lock.lock_id, "lock released");
                Ok(())
            }
        }
    }

    /// Acquire a lease wrapped in a guard that releases on drop
    pub async fn acquire_lease(
        self: &Arc<Self>,
        game_id: &str,
        holder_id: &str,
        operation: &str,
        ttl: Option<Duration>,
    ) -> Result<LockLease> {
        let info = self.acquire_lock(game_id, holder_id, operation, ttl).await?;
        Ok(LockLease::new(info, self.clone()))
    }

    /// Fails unless `lock` is still the live lease in the store
    pub async fn verify_fence(
        &self,
        lock: &LockInfo,
    ) -> Result<()> {
        let stored: Option<LockInfo> = get_json(self.store.as_ref(), &lock_key(&lock.game_id)).await?;
        let now = self.clock.now_ms();
        match stored {
            Some(current) if current.lock_id == lock.lock_id && !current.is_expired_at(now) => Ok(()),
            _ => Err(LockError::Fenced {
                game_id: lock.game_id.clone(),
                lock_id: lock.lock_id.clone(),
            }
            .into()),
        }
    }

    /// Current live lease for `game_id`, if any
    pub async fn current_lock(
        &self,
        game_id: &str,
    ) -> Result<Option<LockInfo>> {
        let stored: Option<LockInfo> = get_json(self.store.as_ref(), &lock_key(game_id)).await?;
        let now = self.clock.now_ms();
        Ok(stored.filter(|l| !l.is_expired_at(now)))
    }

    /// Drop locally tracked leases past expiry. Store keys are left alone;
    /// they expire through their own TTL.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.held.len();
        self.held.retain(|_, lock| !lock.is_expired_at(now));
        let removed = before.saturating_sub(self.held.len());
        if removed > 0 {
            debug!(removed, "swept expired local locks");
        }
        removed
    }

    /// Unexpired leases held by this process
    pub fn active_locks(&self) -> usize {
        let now = self.clock.now_ms();
        self.held.iter().filter(|l| !l.is_expired_at(now)).count()
    }

    /// Locally tracked entries, including expired ones not yet swept
    pub fn tracked_locks(&self) -> usize {
        self.held.len()
    }

    fn forget(
        &self,
        game_id: &str,
        lock_id: &str,
    ) {
        self.held.remove_if(game_id, |_, l| l.lock_id == lock_id);
    }
}

fn held(lock: &LockInfo) -> Error {
    LockError::Held {
        game_id: lock.game_id.clone(),
        holder_id: lock.holder_id.clone(),
        operation: lock.operation.clone(),
        expires_at: lock.expires_at,
    }
    .into()
}
