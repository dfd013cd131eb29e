//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use agentlink_core::AgentTeam;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::bridge::SessionBridge;
use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush queued frames on close.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands buffered while an earlier one is still running.
const MAX_BACKLOG: usize = 64;

/// Everything a session needs from its host.
#[derive(Clone)]
pub struct SessionContext {
    /// Agent registry.
    pub team: Arc<dyn AgentTeam>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connection tracking.
    pub connections: Arc<ConnectionRegistry>,
    /// Fires when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection
/// 2. Feeds text (and UTF-8 binary) frames to a [`SessionBridge`] in order
/// 3. Writes outbound frames and periodic Pings from a separate task,
///    dropping clients silent past the heartbeat timeout
/// 4. On close, error, or server shutdown: closes the bridge, flushes the
///    writer, and unregisters
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(ws: WebSocket, client_id: String, ctx: SessionContext) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(ctx.config.outbound_buffer.max(1));
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!(client_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.connections.add(Arc::clone(&connection)).await;

    let writer_stop = CancellationToken::new();
    let writer_gone = CancellationToken::new();
    let mut outbound = tokio::spawn(run_writer(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        ctx.config.heartbeat_interval(),
        ctx.config.heartbeat_timeout(),
        writer_stop.clone(),
        writer_gone.clone(),
    ));

    let mut bridge = SessionBridge::new(Arc::clone(&ctx.team), Arc::clone(&connection));
    let mut backlog: VecDeque<String> = VecDeque::new();

    'session: loop {
        let text = match backlog.pop_front() {
            Some(text) => text,
            None => {
                let frame = tokio::select! {
                    () = ctx.shutdown.cancelled() => {
                        info!(client_id, "server shutting down, closing session");
                        break;
                    }
                    () = writer_gone.cancelled() => break,
                    frame = ws_rx.next() => frame,
                };
                match inbound(frame, &connection) {
                    Inbound::Command(text) => text,
                    Inbound::Skip => continue,
                    Inbound::End => break,
                }
            }
        };

        // Keep reading while the command runs so Pongs still count and a
        // close or shutdown is not stuck behind a slow agent call. Commands
        // that arrive meanwhile wait their turn in the backlog.
        let handled = bridge.handle_text(&text);
        tokio::pin!(handled);
        loop {
            tokio::select! {
                () = &mut handled => break,
                () = ctx.shutdown.cancelled() => {
                    info!(client_id, "server shutting down, abandoning in-flight command");
                    break 'session;
                }
                () = writer_gone.cancelled() => break 'session,
                frame = ws_rx.next(), if backlog.len() < MAX_BACKLOG => {
                    match inbound(frame, &connection) {
                        Inbound::Command(text) => backlog.push_back(text),
                        Inbound::Skip => {}
                        Inbound::End => break 'session,
                    }
                }
            }
        }
    }

    bridge.close().await;
    writer_stop.cancel();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut outbound).await.is_err() {
        outbound.abort();
    }
    ctx.connections.remove(&client_id).await;

    let age = connection.age();
    info!(client_id, sent = connection.sent_count(), age_secs = age.as_secs(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
}

enum Inbound {
    Command(String),
    Skip,
    End,
}

/// Classify one read from the socket. Any frame counts as a sign of life.
fn inbound(frame: Option<Result<Message, axum::Error>>, connection: &ClientConnection) -> Inbound {
    let msg = match frame {
        Some(Ok(msg)) => msg,
        Some(Err(e)) => {
            debug!(conn_id = %connection.id, error = %e, "websocket read failed");
            return Inbound::End;
        }
        None => return Inbound::End,
    };
    connection.mark_alive();

    match msg {
        Message::Text(t) => Inbound::Command(t.to_string()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(s) => Inbound::Command(s.to_owned()),
            Err(_) => {
                info!(conn_id = %connection.id, len = data.len(), "received non-UTF8 binary frame");
                Inbound::Skip
            }
        },
        Message::Close(_) => {
            info!(conn_id = %connection.id, "client sent close frame");
            Inbound::End
        }
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
    }
}

/// Drain the outbound queue into the socket and keep the client honest
/// with Pings. Cancels `gone` on exit.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    ping_every: Duration,
    pong_timeout: Duration,
    stop: CancellationToken,
    gone: CancellationToken,
) {
    let _gone = gone.drop_guard();
    let mut ping_interval = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                while let Ok(text) = outbound.try_recv() {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        return;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
            msg = outbound.recv() => {
                match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > pong_timeout {
                    warn!(conn_id = %connection.id, "client unresponsive for {pong_timeout:?}, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

