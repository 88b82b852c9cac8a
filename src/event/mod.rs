//! Per-game ordered event delivery
//!
//! ```text
//! emit() -> validate -> queues[gameId].push_back
//!                           |
//!                 process_event_queue(gameId)   (single-flight per game)
//!                           |
//!      persist event:<id> + history:<gameId> -> fan-out to subscribers
//! ```
//!
//! Queue phase per game:
//! `idle -> (enqueue) -> queued -> (drain flag taken) -> draining -> (empty) -> idle`
mod dispatcher;
mod event;
mod subscription;

#[cfg(test)]
mod event_test;

pub use dispatcher::*;
pub use event::*;
pub use subscription::*;
