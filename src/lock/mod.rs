//! Per-game mutual exclusion
//!
//! A lease is a `LockInfo` document stored at `lock:<gameId>` with a TTL.
//! Ownership is fenced by `lock_id`: only the holder that was issued a given
//! id may release it, and a holder whose lease was reassigned can no longer
//! pass [`LockManager::verify_fence`].
//!
//! ```text
//! unlocked --acquire--> locked(holder, expiry) --release | expiry--> unlocked
//! ```
mod lease;
mod manager;


pub use lease::*;
pub use manager::*;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Lease token; unique per acquisition
    pub lock_id: String,
    pub game_id: String,
    pub holder_id: String,
    /// What the holder intends to do, for contention reports
    pub operation: String,
    /// Epoch milliseconds
    pub acquired_at: u64,
    /// Epoch milliseconds
    pub expires_at: u64,
}

impl LockInfo {
    pub fn is_expired_at(
        &self,
        now_ms: u64,
    ) -> bool {
        now_ms >= self.expires_at
    }
}
