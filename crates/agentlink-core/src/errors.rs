//! Errors raised by agent collaborators.

use thiserror::Error;

/// Failure of an agent registry or runtime operation.
///
/// The bridge reports these to the client as the `Display` text, so messages
/// are written for a human reading a client log.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No agent with this id exists.
    #[error("Agent not found: {0}")]
    NotFound(String),

    /// No template is registered for this agent type.
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    /// A human response referenced a request that is not pending.
    #[error("No pending human request with sequence {0}")]
    UnknownHumanRequest(u64),

    /// The agent has shut down.
    #[error("Agent {0} has exited")]
    Exited(String),

    /// The event subscriber fell behind and events were dropped.
    #[error("Event stream lagged by {0} events")]
    Lagged(u64),

    /// Any other runtime failure.
    #[error("{message}")]
    Failed {
        /// Description.
        message: String,
    },
}

impl AgentError {
    /// Build a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            AgentError::NotFound("a1".into()).to_string(),
            "Agent not found: a1"
        );
        assert_eq!(
            AgentError::UnknownAgentType("nope".into()).to_string(),
            "Unknown agent type: nope"
        );
        assert_eq!(
            AgentError::UnknownHumanRequest(4).to_string(),
            "No pending human request with sequence 4"
        );
        assert_eq!(AgentError::Lagged(12).to_string(), "Event stream lagged by 12 events");
    }

    #[test]
    fn failed_uses_message_verbatim() {
        let err = AgentError::failed("disk full");
        assert_eq!(err.to_string(), "disk full");
    }
}
