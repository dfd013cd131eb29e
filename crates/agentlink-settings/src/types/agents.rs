//! Agent pool settings.

use serde::{Deserialize, Serialize};

/// Settings for the local agent pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentPoolSettings {
    /// Agents spawned at startup, by type.
    pub spawn_on_start: Vec<String>,
    /// Per-agent event channel capacity. Slow subscribers past this lag.
    pub event_buffer: usize,
}

impl Default for AgentPoolSettings {
    fn default() -> Self {
        Self {
            spawn_on_start: Vec::new(),
            event_buffer: 256,
        }
    }
}
