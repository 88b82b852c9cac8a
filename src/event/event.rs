use std::sync::Arc;

use nanoid::nanoid;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::EventError;
use crate::Result;

/// Something that happened in a game; immutable once emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub game_id: String,
    /// Epoch milliseconds; `0` until the dispatcher stamps it on enqueue
    pub timestamp: u64,
    #[serde(default)]
    pub data: Value,
    /// Players the event concerns; `None` means everyone in the game
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_players: Option<Vec<String>>,
    pub is_public: bool,
}

impl GameEvent {
    pub fn new(
        event_type: impl Into<String>,
        game_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: nanoid!(),
            event_type: event_type.into(),
            game_id: game_id.into(),
            timestamp: 0,
            data,
            affected_players: None,
            is_public: true,
        }
    }

    pub fn with_affected_players(
        mut self,
        players: Vec<String>,
    ) -> Self {
        self.affected_players = Some(players);
        self
    }

    pub fn with_timestamp(
        mut self,
        timestamp: u64,
    ) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the event as visible only to `affected_players`
    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EventError::Validation("event id must not be empty".into()).into());
        }
        if self.event_type.trim().is_empty() {
            return Err(EventError::Validation("event type must not be empty".into()).into());
        }
        if self.game_id.trim().is_empty() {
            return Err(EventError::Validation("event game id must not be empty".into()).into());
        }
        if !(self.data.is_object() || self.data.is_null()) {
            return Err(EventError::Validation(format!(
                "event data must be an object or null, got {}",
                json_kind(&self.data)
            ))
            .into());
        }
        if !self.is_public && self.affected_players.as_ref().map_or(true, |p| p.is_empty()) {
            return Err(EventError::Validation("private event must name its affected players".into()).into());
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An event waiting in its game's queue
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: Arc<GameEvent>,
    /// Failed persistence attempts so far
    pub retry_count: u32,
    pub queued_at: u64,
}

/// Where a game's queue currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// Nothing queued, nobody draining
    Idle,
    /// Events waiting for a drainer
    Queued,
    /// A drainer holds the game's flag
    Draining,
}

/// What happened to one dequeued event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Persisted and fanned out; `handlers_failed` of the subscribers errored or panicked
    Persisted { handlers_failed: usize },
    /// Persistence kept failing past the retry budget
    Dropped,
}
