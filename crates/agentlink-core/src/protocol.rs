//! Wire protocol between a client and the bridge.
//!
//! Every frame is one JSON object with a `type` discriminator. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentSummary;
use crate::events::AgentEventEnvelope;

/// Command sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// List every live agent.
    ListAgents,
    /// Spawn an agent from a template.
    CreateAgent {
        /// Template type tag.
        agent_type: String,
    },
    /// Subscribe this connection to an agent's events.
    ConnectAgent {
        /// Agent to subscribe to.
        agent_id: String,
    },
    /// Send input to the subscribed agent.
    Input {
        /// User message.
        message: String,
    },
    /// Answer a human request of the subscribed agent.
    HumanResponse {
        /// Sequence of the request being answered.
        sequence: u64,
        /// Response payload.
        #[serde(default)]
        response: Value,
    },
    /// Delete an agent.
    DeleteAgent {
        /// Agent to delete.
        agent_id: String,
    },
}

impl ClientMessage {
    /// Wire tag, used for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListAgents => "listAgents",
            Self::CreateAgent { .. } => "createAgent",
            Self::ConnectAgent { .. } => "connectAgent",
            Self::Input { .. } => "input",
            Self::HumanResponse { .. } => "humanResponse",
            Self::DeleteAgent { .. } => "deleteAgent",
        }
    }
}

/// Reply or notification sent to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Reply to `listAgents`.
    AgentList {
        /// Every live agent.
        agents: Vec<AgentSummary>,
    },
    /// Reply to `createAgent`.
    AgentCreated {
        /// New agent id.
        agent_id: String,
        /// New agent name.
        name: String,
    },
    /// Reply to `connectAgent`.
    AgentConnected {
        /// Subscribed agent id.
        agent_id: String,
    },
    /// Reply to `deleteAgent`.
    AgentDeleted {
        /// Deleted agent id.
        agent_id: String,
    },
    /// Event forwarded from the subscribed agent.
    Event {
        /// The envelope, verbatim.
        event: AgentEventEnvelope,
    },
    /// Failure notification.
    Error {
        /// Description.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire tag, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentList { .. } => "agentList",
            Self::AgentCreated { .. } => "agentCreated",
            Self::AgentConnected { .. } => "agentConnected",
            Self::AgentDeleted { .. } => "agentDeleted",
            Self::Event { .. } => "event",
            Self::Error { .. } => "error",
        }
    }
}
