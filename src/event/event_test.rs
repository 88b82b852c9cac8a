use serde_json::json;

use super::*;
use crate::ErrorCode;

#[test]
fn test_new_event_is_public_and_valid() {
    let event = GameEvent::new("turn_ended", "g1", json!({"turn": 3}));

    assert!(!event.id.is_empty());
    assert!(event.is_public);
    assert_eq!(event.timestamp, 0);
    assert!(event.validate().is_ok());
}

#[test]
fn test_null_data_is_accepted() {
    assert!(GameEvent::new("tick", "g1", json!(null)).validate().is_ok());
}

#[test]
fn test_scalar_data_is_rejected() {
    let err = GameEvent::new("tick", "g1", json!(42)).validate().unwrap_err();

    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(err.to_string().contains("number"));
}

#[test]
fn test_blank_identity_fields_are_rejected() {
    let mut event = GameEvent::new("tick", "g1", json!({}));
    event.event_type = "  ".into();
    assert!(event.validate().is_err());

    let event = GameEvent::new("tick", "", json!({}));
    assert!(event.validate().is_err());

    let mut event = GameEvent::new("tick", "g1", json!({}));
    event.id.clear();
    assert!(event.validate().is_err());
}

#[test]
fn test_private_event_needs_audience() {
    let event = GameEvent::new("whisper", "g1", json!({})).private();
    assert!(event.validate().is_err());

    let event = GameEvent::new("whisper", "g1", json!({}))
        .with_affected_players(vec!["p2".into()])
        .private();
    assert!(event.validate().is_ok());
}

#[test]
fn test_wire_format_uses_type_and_camel_case() {
    let event = GameEvent::new("vote_cast", "g1", json!({"choice": "a"}))
        .with_timestamp(1_700_000_000_000)
        .with_affected_players(vec!["p1".into()]);

    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["type"], "vote_cast");
    assert_eq!(value["gameId"], "g1");
    assert_eq!(value["isPublic"], true);
    assert_eq!(value["affectedPlayers"], json!(["p1"]));
    assert_eq!(value["timestamp"], 1_700_000_000_000u64);
    let back: GameEvent = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}
