use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TypingConfig;

/// One entry of a recorded typing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Text { ch: char },
    Enter,
    Backspace,
    Wait { micros: u64 },
}

impl Action {
    pub fn wait(duration: Duration) -> Self {
        Action::Wait {
            micros: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_keystroke(&self) -> bool {
        !matches!(self, Action::Wait { .. })
    }
}

/// A recorded dry run: the config it used and every action it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rehearsal {
    pub config: TypingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub actions: Vec<Action>,
}
