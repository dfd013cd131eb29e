//! Agent event envelope.
//!
//! An agent's live stream produces [`AgentEventEnvelope`]s: a `type` tag and a
//! payload whose shape depends on the tag. The bridge never looks inside one;
//! it forwards envelopes to the client exactly as produced.
//!
//! Producers build envelopes from the typed [`AgentEvent`] enum, which covers
//! every tag the protocol defines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque tagged payload emitted by an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentEventEnvelope {
    /// Event tag (e.g. `output.chat`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Tag-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl AgentEventEnvelope {
    /// Build an envelope from a raw tag and payload.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Severity of an `output.system` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemLevel {
    /// Informational.
    Info,
    /// Something the user should look at.
    Warning,
    /// A failure.
    Error,
}

/// Every event an agent can emit, with its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AgentEvent {
    /// Chat output.
    #[serde(rename = "output.chat")]
    OutputChat {
        /// Text content.
        content: String,
    },
    /// Reasoning output.
    #[serde(rename = "output.reasoning")]
    OutputReasoning {
        /// Text content.
        content: String,
    },
    /// System message.
    #[serde(rename = "output.system")]
    OutputSystem {
        /// Message text.
        message: String,
        /// Severity.
        level: SystemLevel,
    },
    /// Agent started working.
    #[serde(rename = "state.busy")]
    StateBusy {
        /// What the agent is doing.
        message: String,
    },
    /// Agent finished working.
    #[serde(rename = "state.notBusy")]
    StateNotBusy {},
    /// Agent is idle and waiting for input.
    #[serde(rename = "state.idle")]
    StateIdle {},
    /// Current operation was aborted.
    #[serde(rename = "state.aborted")]
    StateAborted {
        /// Why it was aborted.
        reason: String,
    },
    /// Agent exited.
    #[serde(rename = "state.exit")]
    StateExit {},
    /// Input was accepted.
    #[serde(rename = "input.received")]
    InputReceived {
        /// The input text.
        message: String,
    },
    /// Agent asks a human for something.
    #[serde(rename = "human.request")]
    HumanRequest {
        /// Request payload.
        request: Value,
        /// Correlation number for the response.
        sequence: u64,
    },
    /// A human answered a request.
    #[serde(rename = "human.response")]
    #[serde(rename_all = "camelCase")]
    HumanResponse {
        /// Sequence of the request being answered.
        response_to: u64,
        /// Response payload.
        response: Value,
    },
    /// Parts of agent state were reset.
    #[serde(rename = "reset")]
    Reset {
        /// Which parts.
        what: Vec<String>,
    },
}

impl AgentEvent {
    /// Wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OutputChat { .. } => "output.chat",
            Self::OutputReasoning { .. } => "output.reasoning",
            Self::OutputSystem { .. } => "output.system",
            Self::StateBusy { .. } => "state.busy",
            Self::StateNotBusy {} => "state.notBusy",
            Self::StateIdle {} => "state.idle",
            Self::StateAborted { .. } => "state.aborted",
            Self::StateExit {} => "state.exit",
            Self::InputReceived { .. } => "input.received",
            Self::HumanRequest { .. } => "human.request",
            Self::HumanResponse { .. } => "human.response",
            Self::Reset { .. } => "reset",
        }
    }

    /// Convert into an opaque envelope.
    pub fn into_envelope(self) -> AgentEventEnvelope {
        match serde_json::to_value(&self) {
            Ok(Value::Object(mut map)) => {
                let data = map.remove("data").unwrap_or_else(|| Value::Object(Default::default()));
                AgentEventEnvelope::new(self.event_type(), data)
            }
            // Unit-like variants always serialize to an object; keep the tag regardless.
            _ => AgentEventEnvelope::new(self.event_type(), Value::Object(Default::default())),
        }
    }
}

impl From<AgentEvent> for AgentEventEnvelope {
    fn from(event: AgentEvent) -> Self {
        event.into_envelope()
    }
}
