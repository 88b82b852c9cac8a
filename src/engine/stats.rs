use std::collections::HashMap;

use serde::Serialize;

/// Point-in-time counters for operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Unexpired leases held by this process
    pub active_locks: usize,
    /// Atomic operations currently executing or backing off
    pub queued_operations: usize,
    /// Events waiting per game
    pub queued_events: HashMap<String, usize>,
    pub subscriptions: usize,
    pub events_persisted: u64,
    pub events_dropped: u64,
}
