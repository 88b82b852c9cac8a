//! Concurrency core for turn-based multiplayer backends.
//!
//! Many players act concurrently against one shared, versioned game state.
//! This crate keeps those actions from corrupting the state and delivers the
//! events they produce in a consistent per-game order:
//!
//! - [`LockManager`]: per-game lease with TTL and ownership fencing
//! - [`AtomicExecutor`]: optimistic-concurrency state mutation with bounded retries
//! - [`EventDispatcher`]: per-game FIFO queue with single-flight draining
//! - [`SubscriptionRegistry`]: event type to handler bookkeeping
//! - [`GameEngine`]: the composition root wiring them over one [`VersionedStore`]
mod config;
mod core;
mod engine;
mod errors;
mod event;
mod lock;
mod metrics;
mod storage;
pub mod utils;

pub use core::*;

pub use config::*;
pub use engine::*;
pub use errors::*;
pub use event::*;
pub use lock::*;
pub use metrics::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
