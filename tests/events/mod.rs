use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use turnstile::AtomicOperation;
use turnstile::EngineConfig;
use turnstile::Error;
use turnstile::GameEvent;
use turnstile::QueuePhase;
use turnstile::WILDCARD_EVENT_TYPE;

use crate::common::engine_with;
use crate::common::engine_with_game;

#[tokio::test]
async fn test_emit_order_is_delivery_and_history_order() {
    let engine = engine_with(EngineConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe("card_played", move |event: Arc<GameEvent>| {
        let sink = sink.clone();
        async move {
            sink.lock().push(event.data["name"].as_str().unwrap_or_default().to_string());
            Ok::<(), Error>(())
        }
    });

    engine
        .emit(GameEvent::new("card_played", "g1", json!({ "name": "A", "order": 1 })))
        .await
        .unwrap();
    engine
        .emit(GameEvent::new("card_played", "g1", json!({ "name": "B", "order": 2 })))
        .await
        .unwrap();

    assert_eq!(*seen.lock(), vec!["A".to_string(), "B".to_string()]);
    let history: Vec<_> = engine
        .get_event_history("g1", None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.data["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(history, vec!["A", "B"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_emitters_get_exactly_once_fifo_delivery() {
    let engine = engine_with(EngineConfig::default());
    let delivered: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    engine.subscribe("tick", move |event: Arc<GameEvent>| {
        let sink = sink.clone();
        async move {
            let emitter = event.data["emitter"].as_u64().unwrap_or_default();
            let seq = event.data["seq"].as_u64().unwrap_or_default();
            sink.lock().push((emitter, seq));
            tokio::task::yield_now().await;
            Ok::<(), Error>(())
        }
    });

    let emitters = 8u64;
    let per_emitter = 25u64;
    let mut tasks = Vec::new();
    for emitter in 0..emitters {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 0..per_emitter {
                let event = GameEvent::new("tick", "g1", json!({ "emitter": emitter, "seq": seq }));
                engine.emit(event).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let delivered = delivered.lock();
    assert_eq!(delivered.len() as u64, emitters * per_emitter);
    // each emitter's events arrive in the order it emitted them
    let mut last: HashMap<u64, u64> = HashMap::new();
    for (emitter, seq) in delivered.iter() {
        if let Some(prev) = last.insert(*emitter, *seq) {
            assert!(*seq > prev, "emitter {emitter} delivered {seq} after {prev}");
        }
    }
    assert_eq!(engine.get_stats().events_persisted, emitters * per_emitter);
    assert_eq!(engine.dispatcher().queue_phase("g1"), QueuePhase::Idle);
    assert!(engine.get_stats().queued_events.is_empty());
}

#[tokio::test]
async fn test_wildcard_subscriber_sees_every_game_event() {
    let engine = engine_with_game("g1", EngineConfig::default()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe(WILDCARD_EVENT_TYPE, move |event: Arc<GameEvent>| {
        let sink = sink.clone();
        async move {
            sink.lock().push(event.event_type.clone());
            Ok::<(), Error>(())
        }
    });

    engine
        .execute_and_emit(AtomicOperation::new("g1", "p1", 0, |s| Ok(s.next_version())), |state| {
            GameEvent::new("state_changed", state.game_id.clone(), json!({ "version": state.version() }))
        })
        .await
        .into_result()
        .unwrap();
    engine.emit(GameEvent::new("chat", "g1", json!({ "text": "gg" }))).await.unwrap();

    assert_eq!(*seen.lock(), vec!["state_changed".to_string(), "chat".to_string()]);
}

#[tokio::test]
async fn test_handler_failures_never_reach_the_emitter() {
    let engine = engine_with(EngineConfig::default());
    engine.subscribe("move", |_event: Arc<GameEvent>| async {
        Err::<(), Error>(Error::Fatal("subscriber crashed".into()))
    });

    assert!(engine.emit(GameEvent::new("move", "g1", json!({}))).await.is_ok());
    assert_eq!(engine.get_event_history("g1", None).await.unwrap().len(), 1);
}
