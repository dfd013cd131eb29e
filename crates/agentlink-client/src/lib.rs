//! # agentlink-client
//!
//! Async client for the agentlink WebSocket protocol.
//!
//! ```ignore
//! let mut client = AgentClient::connect("ws://127.0.0.1:9300/ws").await?;
//! client.create_agent("chat").await?;
//! while let Some(msg) = client.recv().await {
//!     println!("{msg:?}");
//! }
//! ```

#![deny(unsafe_code)]

pub mod errors;

use agentlink_core::{AgentEventEnvelope, ClientMessage, ServerMessage};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

pub use errors::{ClientError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Buffered server messages before the reader task waits on the consumer.
const INCOMING_BUFFER: usize = 256;

/// Connected agentlink client.
///
/// A background task decodes every server frame; read them in arrival order
/// with [`recv`](Self::recv).
pub struct AgentClient {
    sink: Option<WsSink>,
    incoming: mpsc::Receiver<ServerMessage>,
    reader: JoinHandle<()>,
}

impl AgentClient {
    /// Open a WebSocket to `url` (e.g. `ws://127.0.0.1:9300/ws`).
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let (sink, mut stream) = ws.split();
        let (tx, incoming) = mpsc::channel(INCOMING_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable server message"),
                }
            }
        });

        debug!(url, "connected");
        Ok(Self {
            sink: Some(sink),
            incoming,
            reader,
        })
    }

    /// Whether [`disconnect`](Self::disconnect) has not been called yet.
    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Send a raw command.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ClientError::NotConnected)?;
        let json = serde_json::to_string(message)?;
        sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Request the agent list.
    pub async fn list_agents(&mut self) -> Result<()> {
        self.send(&ClientMessage::ListAgents).await
    }

    /// Spawn an agent from a template.
    pub async fn create_agent(&mut self, agent_type: &str) -> Result<()> {
        self.send(&ClientMessage::CreateAgent {
            agent_type: agent_type.to_owned(),
        })
        .await
    }

    /// Subscribe this connection to an agent's events.
    pub async fn connect_agent(&mut self, agent_id: &str) -> Result<()> {
        self.send(&ClientMessage::ConnectAgent {
            agent_id: agent_id.to_owned(),
        })
        .await
    }

    /// Send input to the subscribed agent.
    pub async fn send_input(&mut self, message: &str) -> Result<()> {
        self.send(&ClientMessage::Input {
            message: message.to_owned(),
        })
        .await
    }

    /// Answer a human request of the subscribed agent.
    pub async fn send_human_response(&mut self, sequence: u64, response: Value) -> Result<()> {
        self.send(&ClientMessage::HumanResponse { sequence, response })
            .await
    }

    /// Delete an agent.
    pub async fn delete_agent(&mut self, agent_id: &str) -> Result<()> {
        self.send(&ClientMessage::DeleteAgent {
            agent_id: agent_id.to_owned(),
        })
        .await
    }

    /// Next server message, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.incoming.recv().await
    }

    /// Skip messages until one of wire type `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Option<ServerMessage> {
        while let Some(msg) = self.recv().await {
            if msg.kind() == kind {
                return Some(msg);
            }
        }
        None
    }

    /// Skip messages until an `event` whose envelope type is `event_type`
    /// (e.g. `output.chat`) arrives, and return that envelope.
    pub async fn recv_event(&mut self, event_type: &str) -> Option<AgentEventEnvelope> {
        while let Some(msg) = self.recv().await {
            if let ServerMessage::Event { event } = msg {
                if event.event_type == event_type {
                    return Some(event);
                }
            }
        }
        None
    }

    /// Close the socket. Later sends fail with [`ClientError::NotConnected`].
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.close().await?;
        }
        Ok(())
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
