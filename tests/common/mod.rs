use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use turnstile::BackoffPolicy;
use turnstile::EngineConfig;
use turnstile::GameEngine;
use turnstile::MemoryStore;
use turnstile::SystemClock;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// Retry policy tuned for heavy contention in tests: many short retries
pub fn contended_policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        timeout_ms: 30_000,
        base_delay_ms: 1,
        max_delay_ms: 20,
        jitter_ratio: 0.5,
    }
}

pub fn engine_with(config: EngineConfig) -> Arc<GameEngine> {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(clock.clone()));
    Arc::new(GameEngine::new(config, store, clock))
}

pub async fn engine_with_game(
    game_id: &str,
    config: EngineConfig,
) -> Arc<GameEngine> {
    let engine = engine_with(config);
    engine
        .create_game(game_id, "playing", json!({ "counter": 0 }))
        .await
        .expect("create game");
    engine
}
