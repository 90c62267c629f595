//! Episode identification for uploaded clips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one upload attempt of one training episode.
///
/// Used for logging only: attempts are independent and nothing is shared
/// between two attempts of the same episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EpisodeKey {
    pub episode_number: i64,
    pub attempt_number: u32,
}

impl EpisodeKey {
    pub fn new(episode_number: i64, attempt_number: u32) -> Self {
        Self {
            episode_number,
            attempt_number,
        }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "episode={} attempt={}",
            self.episode_number, self.attempt_number
        )
    }
}
