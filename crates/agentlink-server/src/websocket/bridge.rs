//! Per-connection session bridge.
//!
//! A [`SessionBridge`] owns one connection's protocol state: the agent it is
//! subscribed to (held weakly, the registry owns agents) and the forwarding
//! task pumping that agent's events to the client. Commands are handled one
//! at a time; at most one forwarding task is alive at any instant.

use std::sync::{Arc, Weak};

use agentlink_core::{
    AgentError, AgentHandle, AgentInput, AgentTeam, ClientMessage, ServerMessage,
};
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::forwarder::{self, ForwardOutcome};
use crate::metrics::{COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};

/// Failure of one client command. `Display` is the wire `error.message`.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The frame was not a valid command.
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    /// `connectAgent` named an id the registry does not know.
    #[error("Agent not found")]
    AgentNotFound,

    /// `input` or `humanResponse` arrived with no subscription.
    #[error("No agent connected")]
    NoAgentConnected,

    /// A registry or agent call failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

struct Forwarding {
    agent_id: String,
    cancel: CancellationToken,
    task: JoinHandle<ForwardOutcome>,
}

/// Protocol state machine for one connection.
pub struct SessionBridge {
    team: Arc<dyn AgentTeam>,
    connection: Arc<ClientConnection>,
    subscribed: Option<Weak<dyn AgentHandle>>,
    forwarding: Option<Forwarding>,
}

impl SessionBridge {
    /// Create a bridge with no subscription.
    pub fn new(team: Arc<dyn AgentTeam>, connection: Arc<ClientConnection>) -> Self {
        Self {
            team,
            connection,
            subscribed: None,
            forwarding: None,
        }
    }

    /// Id of the subscribed agent, if it is still alive.
    pub fn subscribed_agent_id(&self) -> Option<String> {
        self.subscribed
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|agent| agent.id().to_owned())
    }

    /// Whether a forwarding task is still running.
    pub fn is_forwarding(&self) -> bool {
        self.forwarding
            .as_ref()
            .is_some_and(|f| !f.task.is_finished())
    }

    /// Decode one inbound text frame and handle it.
    ///
    /// Every failure becomes a single `error` message; nothing here ends the
    /// connection.
    pub async fn handle_text(&mut self, text: &str) {
        let (kind, result) = match serde_json::from_str::<ClientMessage>(text) {
            Ok(command) => {
                let kind = command.kind();
                (kind, self.dispatch(command).await)
            }
            Err(e) => ("invalid", Err(CommandError::Decode(e))),
        };
        counter!(COMMANDS_TOTAL, "command" => kind).increment(1);

        match result {
            Ok(Some(reply)) => {
                let _ = self.connection.send_message(&reply).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(conn_id = %self.connection.id, command = kind, error = %e, "command failed");
                counter!(COMMAND_ERRORS_TOTAL, "command" => kind).increment(1);
                let _ = self
                    .connection
                    .send_message(&ServerMessage::error(e.to_string()))
                    .await;
            }
        }
    }

    /// Handle one decoded command, returning the reply to send (if any).
    ///
    /// `connectAgent` queues its own reply so that it lands before the first
    /// forwarded event.
    #[instrument(skip_all, fields(conn_id = %self.connection.id, command = command.kind()))]
    pub async fn dispatch(
        &mut self,
        command: ClientMessage,
    ) -> Result<Option<ServerMessage>, CommandError> {
        match command {
            ClientMessage::ListAgents => Ok(Some(ServerMessage::AgentList {
                agents: self.team.list_agents(),
            })),
            ClientMessage::CreateAgent { agent_type } => {
                let agent = self.team.spawn_agent(&agent_type).await?;
                info!(agent_id = agent.id(), name = agent.name(), "agent created");
                Ok(Some(ServerMessage::AgentCreated {
                    agent_id: agent.id().to_owned(),
                    name: agent.name().to_owned(),
                }))
            }
            ClientMessage::ConnectAgent { agent_id } => {
                self.connect_agent(agent_id).await?;
                Ok(None)
            }
            ClientMessage::Input { message } => {
                let agent = self.current_agent()?;
                agent.handle_input(AgentInput { message }).await?;
                Ok(None)
            }
            ClientMessage::HumanResponse { sequence, response } => {
                self.human_response(sequence, response)?;
                Ok(None)
            }
            ClientMessage::DeleteAgent { agent_id } => {
                let Some(agent) = self.team.get_agent(&agent_id) else {
                    debug!(agent_id, "delete of unknown agent ignored");
                    return Ok(None);
                };
                self.team.delete_agent(&agent).await?;
                info!(agent_id, "agent deleted");
                Ok(Some(ServerMessage::AgentDeleted { agent_id }))
            }
        }
    }

    async fn connect_agent(&mut self, agent_id: String) -> Result<(), CommandError> {
        let agent = self
            .team
            .get_agent(&agent_id)
            .ok_or(CommandError::AgentNotFound)?;

        // Subscribe before tearing down the old forwarder so nothing the new
        // agent emits in between is missed.
        let cancel = CancellationToken::new();
        let stream = agent.events(cancel.clone());

        self.stop_forwarding().await;
        self.subscribed = Some(Arc::downgrade(&agent));

        let _ = self
            .connection
            .send_message(&ServerMessage::AgentConnected {
                agent_id: agent_id.clone(),
            })
            .await;

        let task = forwarder::spawn(
            agent_id.clone(),
            stream,
            cancel.clone(),
            Arc::clone(&self.connection),
        );
        info!(agent_id, "subscribed to agent events");
        self.forwarding = Some(Forwarding {
            agent_id,
            cancel,
            task,
        });
        Ok(())
    }

    fn human_response(&self, sequence: u64, response: Value) -> Result<(), CommandError> {
        let agent = self.current_agent()?;
        agent.send_human_response(sequence, response)?;
        Ok(())
    }

    fn current_agent(&self) -> Result<Arc<dyn AgentHandle>, CommandError> {
        self.subscribed
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(CommandError::NoAgentConnected)
    }

    /// Cancel the running forwarding task and wait for it to exit.
    async fn stop_forwarding(&mut self) {
        let Some(forwarding) = self.forwarding.take() else {
            return;
        };
        forwarding.cancel.cancel();
        match forwarding.task.await {
            Ok(outcome) => {
                debug!(agent_id = %forwarding.agent_id, ?outcome, "forwarder joined");
            }
            Err(e) => {
                warn!(agent_id = %forwarding.agent_id, error = %e, "forwarder task failed");
            }
        }
    }

    /// Tear down: cancel forwarding and drop the subscription. Idempotent.
    pub async fn close(&mut self) {
        self.stop_forwarding().await;
        self.subscribed = None;
    }
}
