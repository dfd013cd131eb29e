//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every type implements [`Default`] and is
//! marked `#[serde(default)]`, so a partial file only overrides what it names.

mod agents;
mod server;

pub use agents::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9300, "wsPath": "/ws" },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentLinkSettings {
    /// Network and WebSocket settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Agent pool settings.
    pub agents: AgentPoolSettings,
}
