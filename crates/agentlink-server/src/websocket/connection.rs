//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use agentlink_core::ServerMessage;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Represents a connected WebSocket client.
///
/// Outbound frames go through a bounded queue drained by the session's writer
/// task. Senders wait for capacity instead of dropping, so replies and events
/// reach the client in the order they were queued.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Frames queued for the client.
    sent_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            sent_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame, waiting for room in the outbound queue.
    ///
    /// Returns `false` if the writer has gone away.
    pub async fn send(&self, message: Arc<String>) -> bool {
        if self.tx.send(message).await.is_ok() {
            let _ = self.sent_messages.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Serialize a protocol message and queue it.
    pub async fn send_message(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Arc::new(json)).await,
            Err(e) => {
                warn!(conn_id = %self.id, kind = message.kind(), error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Whether the writer side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total frames queued for this connection.
    pub fn sent_count(&self) -> u64 {
        self.sent_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
