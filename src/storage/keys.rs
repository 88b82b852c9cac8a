//! Store key layout

pub const LOCK_KEY_PREFIX: &str = "lock:";
pub const STATE_KEY_PREFIX: &str = "state:";
pub const EVENT_KEY_PREFIX: &str = "event:";
pub const HISTORY_KEY_PREFIX: &str = "history:";

pub fn lock_key(game_id: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{game_id}")
}

pub fn state_key(game_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{game_id}")
}

pub fn event_key(event_id: &str) -> String {
    format!("{EVENT_KEY_PREFIX}{event_id}")
}

pub fn history_key(game_id: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}{game_id}")
}
