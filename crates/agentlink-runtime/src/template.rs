//! Agent templates: the behavior an agent runs for each input.

use agentlink_core::{AgentError, AgentEvent, AgentInput};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::agent::AgentContext;

/// Behavior registered under an agent type tag.
#[async_trait]
pub trait AgentTemplate: Send + Sync {
    /// Type tag clients pass to `createAgent`.
    fn agent_type(&self) -> &str;

    /// Handle one input. Output goes through `ctx`.
    async fn on_input(&self, ctx: &AgentContext, input: AgentInput) -> Result<(), AgentError>;
}

/// Echoes every input back as chat output.
pub struct ChatTemplate;

#[async_trait]
impl AgentTemplate for ChatTemplate {
    fn agent_type(&self) -> &str {
        "chat"
    }

    async fn on_input(&self, ctx: &AgentContext, input: AgentInput) -> Result<(), AgentError> {
        ctx.emit(AgentEvent::OutputChat {
            content: input.message,
        });
        Ok(())
    }
}

/// Asks a human to approve each input before acknowledging it.
///
/// The human answers with `"approve"` (or `true`); anything else rejects.
pub struct ApprovalTemplate;

impl ApprovalTemplate {
    fn is_approval(response: &Value) -> bool {
        match response {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("approve"),
            _ => false,
        }
    }
}

#[async_trait]
impl AgentTemplate for ApprovalTemplate {
    fn agent_type(&self) -> &str {
        "approval"
    }

    async fn on_input(&self, ctx: &AgentContext, input: AgentInput) -> Result<(), AgentError> {
        let request = json!({
            "question": format!("Approve \"{}\"?", input.message),
            "options": ["approve", "reject"],
        });
        let response = ctx.request_human(request).await?;
        let verdict = if Self::is_approval(&response) {
            "Approved"
        } else {
            "Rejected"
        };
        ctx.emit(AgentEvent::OutputChat {
            content: format!("{verdict}: {}", input.message),
        });
        Ok(())
    }
}
