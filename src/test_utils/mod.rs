//! Components shared between unit tests
use once_cell::sync::Lazy;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::GameState;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// State with the given turn and version and an empty score sheet
pub fn game_state(
    game_id: &str,
    turn: u64,
    version: u64,
) -> GameState {
    let mut state = GameState::new(game_id, "play", json!({"score": 0}));
    state.turn = turn;
    state.metadata.version = version;
    state
}
