use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::get_json;
use crate::set_json;
use crate::state_key;
use crate::Result;
use crate::VersionedStore;

/// Versioned game document stored at `state:<gameId>`
///
/// `metadata.version` grows by exactly the operation's increment on every
/// committed atomic operation; `turn` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub turn: u64,
    pub phase: String,
    /// Game-specific payload; the engine never interprets it
    #[serde(default)]
    pub data: Value,
    pub metadata: GameMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub version: u64,
    #[serde(default)]
    pub action_history: Vec<ActionRecord>,
    #[serde(default)]
    pub last_action: Option<ActionRecord>,
}

/// One action as submitted by a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAction {
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl GameAction {
    pub fn new(
        action_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }
}

/// An action after it was applied to a state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action_id: String,
    pub actor_id: String,
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    /// Turn the action produced
    pub turn: u64,
    pub timestamp: u64,
}

impl GameState {
    pub fn new(
        game_id: impl Into<String>,
        phase: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            turn: 0,
            phase: phase.into(),
            data,
            metadata: GameMetadata::default(),
        }
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    /// Copy of this state with the version bumped by one, the usual start of
    /// a transition
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.metadata.version += 1;
        next
    }

    /// Append to the action history, trimming the oldest entries past `cap`
    pub(crate) fn record_action(
        &mut self,
        record: ActionRecord,
        cap: usize,
    ) {
        self.metadata.action_history.push(record.clone());
        let len = self.metadata.action_history.len();
        if len > cap {
            self.metadata.action_history.drain(..len - cap);
        }
        self.metadata.last_action = Some(record);
    }
}

/// Reads and writes `state:<gameId>` documents
///
/// Writes are unconditional; the executor holds the game's lease around them.
#[derive(Debug, Clone)]
pub struct StateRepository {
    store: Arc<dyn VersionedStore>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    pub async fn exists(
        &self,
        game_id: &str,
    ) -> Result<bool> {
        self.store.exists(&state_key(game_id)).await
    }

    pub async fn load(
        &self,
        game_id: &str,
    ) -> Result<Option<GameState>> {
        get_json(self.store.as_ref(), &state_key(game_id)).await
    }

    /// Unconditional write; callers must hold the game's lease
    pub(crate) async fn save(
        &self,
        state: &GameState,
    ) -> Result<()> {
        set_json(self.store.as_ref(), &state_key(&state.game_id), state, None).await
    }
}
