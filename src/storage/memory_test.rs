use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::ManualClock;

fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(10_000));
    (MemoryStore::new(clock.clone()), clock)
}

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let (store, _) = store_with_clock();
    store.set("state:g1", b"v1".to_vec(), None).await.unwrap();

    assert_eq!(store.get("state:g1").await.unwrap(), Some(b"v1".to_vec()));
    assert!(store.exists("state:g1").await.unwrap());
    assert_eq!(store.get("state:g2").await.unwrap(), None);
}

#[tokio::test]
async fn test_key_expires_after_ttl() {
    let (store, clock) = store_with_clock();
    store
        .set("lock:g1", b"x".to_vec(), Some(Duration::from_secs(30)))
        .await
        .unwrap();

    clock.advance(Duration::from_millis(29_999));
    assert!(store.exists("lock:g1").await.unwrap());

    clock.advance(Duration::from_millis(1));
    assert!(!store.exists("lock:g1").await.unwrap());
    assert_eq!(store.get("lock:g1").await.unwrap(), None);
}

#[tokio::test]
async fn test_expire_extends_live_key_only() {
    let (store, clock) = store_with_clock();
    store
        .set("k", b"x".to_vec(), Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
    clock.advance(Duration::from_secs(5));
    assert!(store.exists("k").await.unwrap());

    assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    clock.advance(Duration::from_secs(6));
    assert!(!store.expire("k", Duration::from_secs(1)).await.unwrap());
}

#[tokio::test]
async fn test_delete_reports_live_removal() {
    let (store, clock) = store_with_clock();
    store.set("a", b"1".to_vec(), None).await.unwrap();
    store
        .set("b", b"2".to_vec(), Some(Duration::from_millis(10)))
        .await
        .unwrap();
    clock.advance(Duration::from_millis(20));

    assert!(store.delete("a").await.unwrap());
    assert!(!store.delete("a").await.unwrap());
    assert!(!store.delete("b").await.unwrap());
}

#[tokio::test]
async fn test_purge_expired_reclaims_dead_keys() {
    let (store, clock) = store_with_clock();
    store.set("keep", b"1".to_vec(), None).await.unwrap();
    store
        .set("drop", b"2".to_vec(), Some(Duration::from_millis(5)))
        .await
        .unwrap();
    clock.advance(Duration::from_millis(5));

    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_json_codec_round_trip_through_store() {
    let (store, _) = store_with_clock();
    set_json(&store, "doc", &serde_json::json!({"turn": 3}), None)
        .await
        .unwrap();

    let doc: Option<serde_json::Value> = get_json(&store, "doc").await.unwrap();
    assert_eq!(doc.unwrap()["turn"], 3);

    let missing: Option<serde_json::Value> = get_json(&store, "nope").await.unwrap();
    assert!(missing.is_none());
}
