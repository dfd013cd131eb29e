//! Collaborator interfaces consumed by the bridge.
//!
//! [`AgentTeam`] is the process-wide registry; [`AgentHandle`] is one live
//! agent. Both are injected as trait objects so the bridge treats every call
//! as opaque and possibly failing.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;
use crate::events::AgentEventEnvelope;

/// Live event stream of one agent.
///
/// Ends when the agent stops producing events or the cancel token passed to
/// [`AgentHandle::events`] fires. An `Err` item means the stream failed; no
/// further items follow it.
pub type AgentEventStream = BoxStream<'static, Result<AgentEventEnvelope, AgentError>>;

/// Listing entry for an agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Template type tag.
    #[serde(rename = "type")]
    pub agent_type: String,
}

impl AgentSummary {
    /// Summarize a handle.
    pub fn of(agent: &dyn AgentHandle) -> Self {
        Self {
            id: agent.id().to_owned(),
            name: agent.name().to_owned(),
            agent_type: agent.agent_type().to_owned(),
        }
    }
}

/// Input delivered to an agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInput {
    /// User message.
    pub message: String,
}

/// One live agent.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Stable id.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Template type tag.
    fn agent_type(&self) -> &str;

    /// Open a subscription to this agent's live events.
    ///
    /// The subscription is established when this returns: every event the
    /// agent produces afterwards is observed by the stream, in order, until
    /// `cancel` fires.
    fn events(&self, cancel: CancellationToken) -> AgentEventStream;

    /// Deliver user input. Results arrive on the event stream.
    async fn handle_input(&self, input: AgentInput) -> Result<(), AgentError>;

    /// Answer the pending human request identified by `sequence`.
    fn send_human_response(&self, sequence: u64, response: Value) -> Result<(), AgentError>;
}

/// Registry of live agents.
#[async_trait]
pub trait AgentTeam: Send + Sync {
    /// Every live agent.
    fn list_agents(&self) -> Vec<AgentSummary>;

    /// Look up a live agent.
    fn get_agent(&self, id: &str) -> Option<Arc<dyn AgentHandle>>;

    /// Create an agent from the template registered for `agent_type`.
    async fn spawn_agent(&self, agent_type: &str) -> Result<Arc<dyn AgentHandle>, AgentError>;

    /// Remove an agent and shut it down.
    async fn delete_agent(&self, agent: &Arc<dyn AgentHandle>) -> Result<(), AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_type_field() {
        let summary = AgentSummary {
            id: "a1".into(),
            name: "chat-1".into(),
            agent_type: "chat".into(),
        };
        insta::assert_json_snapshot!(summary, @r#"
        {
          "id": "a1",
          "name": "chat-1",
          "type": "chat"
        }
        "#);
    }
}
