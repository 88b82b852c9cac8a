//! Versioned game state and the optimistic-concurrency executor
mod executor;
mod operation;
mod state;


pub use executor::*;
pub use operation::*;
pub use state::*;
