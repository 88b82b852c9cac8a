//! Composition root
//!
//! One [`GameEngine`] owns the lock manager, executor, dispatcher and
//! subscription registry of a process and the background sweepers that keep
//! their registries bounded.
mod engine;
mod stats;


pub use engine::*;
pub use stats::*;
