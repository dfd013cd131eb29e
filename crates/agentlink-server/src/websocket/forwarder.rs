//! Forwarding task: pumps one agent's event stream into one connection.

use std::sync::Arc;

use agentlink_core::{AgentEventStream, ServerMessage};
use futures::StreamExt;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::connection::ClientConnection;
use crate::metrics::{EVENTS_FORWARDED_TOTAL, FORWARD_ERRORS_TOTAL, FORWARDERS_ACTIVE};

/// How a forwarding task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The cancel token fired. Nothing was sent to the client.
    Cancelled,
    /// The agent's stream finished. Nothing was sent to the client.
    Ended,
    /// The connection's writer went away.
    Disconnected,
    /// The stream failed; the client got one `error` notification with this text.
    Failed(String),
}

/// Spawn [`forward_events`] on the runtime.
pub fn spawn(
    agent_id: String,
    stream: AgentEventStream,
    cancel: CancellationToken,
    connection: Arc<ClientConnection>,
) -> JoinHandle<ForwardOutcome> {
    let span = info_span!("forwarder", conn_id = %connection.id, agent_id = %agent_id);
    tokio::spawn(forward_events(stream, cancel, connection).instrument(span))
}

/// Forward every envelope of `stream` to `connection` as an `event` message.
///
/// Cancellation is checked before each forward and raced against every wait,
/// so once `cancel` fires no further message leaves this task. A stream error
/// is reported to the client only if the task was not cancelled.
pub async fn forward_events(
    mut stream: AgentEventStream,
    cancel: CancellationToken,
    connection: Arc<ClientConnection>,
) -> ForwardOutcome {
    gauge!(FORWARDERS_ACTIVE).increment(1.0);
    let outcome = pump(&mut stream, &cancel, &connection).await;
    gauge!(FORWARDERS_ACTIVE).decrement(1.0);
    debug!(?outcome, "forwarder stopped");
    outcome
}

async fn pump(
    stream: &mut AgentEventStream,
    cancel: &CancellationToken,
    connection: &ClientConnection,
) -> ForwardOutcome {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return ForwardOutcome::Cancelled,
            next = stream.next() => next,
        };

        if cancel.is_cancelled() {
            return ForwardOutcome::Cancelled;
        }

        match next {
            None => return ForwardOutcome::Ended,
            Some(Ok(event)) => {
                let message = ServerMessage::Event { event };
                let sent = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return ForwardOutcome::Cancelled,
                    sent = connection.send_message(&message) => sent,
                };
                if !sent {
                    return ForwardOutcome::Disconnected;
                }
                counter!(EVENTS_FORWARDED_TOTAL).increment(1);
            }
            Some(Err(e)) => {
                let text = format!("Event loop error: {e}");
                warn!(error = %e, "agent event stream failed");
                counter!(FORWARD_ERRORS_TOTAL).increment(1);
                let _ = connection.send_message(&ServerMessage::error(text.clone())).await;
                return ForwardOutcome::Failed(text);
            }
        }
    }
}
