use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use turnstile::AtomicOperation;
use turnstile::EngineConfig;
use turnstile::ErrorCode;
use turnstile::GameAction;
use turnstile::GameEngine;

use crate::common::contended_policy;
use crate::common::enable_logger;
use crate::common::engine_with_game;

fn increment(
    game_id: &str,
    actor_id: &str,
    expected_version: u64,
) -> AtomicOperation {
    AtomicOperation::new(game_id, actor_id, expected_version, |state| {
        let mut next = state.next_version();
        let counter = next.data["counter"].as_u64().unwrap_or(0);
        next.data["counter"] = json!(counter + 1);
        Ok(next)
    })
}

async fn current_version(
    engine: &GameEngine,
    game_id: &str,
) -> u64 {
    engine.get_state(game_id).await.unwrap().unwrap().version()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_under_contention() {
    enable_logger();
    let mut config = EngineConfig::default();
    config.retry.atomic = contended_policy(5);
    let engine = engine_with_game("g1", config).await;

    let mut tasks = Vec::new();
    for actor in 0..32 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let expected = current_version(&engine, "g1").await;
            let result = engine
                .execute_atomic(increment("g1", &format!("p{actor}"), expected))
                .await;
            (expected, result)
        }));
    }

    let mut committed_from = Vec::new();
    for task in tasks {
        let (expected, result) = task.await.unwrap();
        match result.outcome {
            Ok(state) => {
                assert_eq!(state.version(), expected + 1);
                committed_from.push(expected);
            }
            Err(e) => assert!(
                matches!(e.code, ErrorCode::ValidationError | ErrorCode::PermissionDenied),
                "unexpected failure: {e}"
            ),
        }
    }

    let state = engine.get_state("g1").await.unwrap().unwrap();
    assert!(!committed_from.is_empty());
    assert_eq!(state.version(), committed_from.len() as u64);
    assert_eq!(state.data["counter"], committed_from.len() as u64);
    // no two commits started from the same version
    let distinct: HashSet<u64> = committed_from.iter().copied().collect();
    assert_eq!(distinct.len(), committed_from.len());
    assert_eq!(engine.get_stats().queued_operations, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_writer_eventually_commits_when_it_rereads() {
    let mut config = EngineConfig::default();
    config.retry.atomic = contended_policy(2);
    let engine = engine_with_game("g1", config).await;
    let writers = 16u64;

    let mut tasks = Vec::new();
    for actor in 0..writers {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let expected = current_version(&engine, "g1").await;
                let result = engine
                    .execute_atomic(increment("g1", &format!("p{actor}"), expected))
                    .await;
                if result.is_success() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let state = engine.get_state("g1").await.unwrap().unwrap();
    assert_eq!(state.version(), writers);
    assert_eq!(state.data["counter"], writers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_games_do_not_block_each_other() {
    let engine = engine_with_game("g1", EngineConfig::default()).await;
    engine.create_game("g2", "playing", json!({ "counter": 0 })).await.unwrap();

    // p1 parks on g1's lock; g2 stays writable
    let held = engine.acquire_lock("g1", "p1", "long-op", None).await.unwrap();
    let result = engine.execute_atomic(increment("g2", "p2", 0)).await;
    assert!(result.is_success());
    assert_eq!(result.retry_count, 0);

    engine.release_lock(&held).await.unwrap();
}

#[tokio::test]
async fn test_lock_exclusivity_between_holders() {
    let engine = engine_with_game("g1", EngineConfig::default()).await;

    let a = engine.acquire_lock("g1", "a", "move", None).await.unwrap();
    let err = engine.acquire_lock("g1", "b", "move", None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    let forged = turnstile::LockInfo {
        lock_id: "not-a's-token".into(),
        holder_id: "b".into(),
        ..a.clone()
    };
    assert_eq!(engine.release_lock(&forged).await.unwrap_err().code(), ErrorCode::PermissionDenied);

    engine.release_lock(&a).await.unwrap();
    assert!(engine.acquire_lock("g1", "b", "move", None).await.is_ok());
}

#[tokio::test]
async fn test_bounded_retries_with_stale_version() {
    let mut config = EngineConfig::default();
    config.retry.atomic = contended_policy(4);
    let engine = engine_with_game("g1", config).await;
    engine.execute_atomic(increment("g1", "p1", 0)).await.into_result().unwrap();

    let result = engine.execute_atomic(increment("g1", "p2", 0)).await;

    assert_eq!(result.error().unwrap().code, ErrorCode::ValidationError);
    assert_eq!(result.retry_count, 4);
    assert_eq!(current_version(&engine, "g1").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_are_additive() {
    let mut config = EngineConfig::default();
    config.retry.atomic = contended_policy(50);
    let engine = engine_with_game("g1", config).await;

    let mut tasks = Vec::new();
    for actor in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .execute_batch(
                    "g1",
                    &format!("p{actor}"),
                    vec![GameAction::new("draw", json!({})), GameAction::new("play", json!({}))],
                )
                .await
        }));
    }
    let mut committed = 0u64;
    for task in tasks {
        if task.await.unwrap().is_success() {
            committed += 1;
        }
    }

    let state = engine.get_state("g1").await.unwrap().unwrap();
    assert!(committed > 0);
    assert_eq!(state.turn, 2 * committed);
    assert_eq!(state.version(), 2 * committed);
    assert_eq!(state.metadata.action_history.len() as u64, 2 * committed);
}

#[tokio::test]
async fn test_engine_lifecycle() {
    let engine = engine_with_game("g1", EngineConfig::default()).await;
    engine.start();
    assert!(engine.is_running());

    let result = engine.execute_atomic(increment("g1", "p1", 0)).await;
    assert!(result.is_success());

    engine.stop().await;
    assert!(!engine.is_running());
}
