use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GameConfig {
    /// Entries kept in `metadata.action_history`
    #[serde(default = "default_action_history_cap")]
    pub action_history_cap: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            action_history_cap: default_action_history_cap(),
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.action_history_cap == 0 {
            return Err(Error::Config(ConfigError::Message(
                "game.action_history_cap must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_action_history_cap() -> usize {
    100
}
