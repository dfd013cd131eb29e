//! Client error types.

use thiserror::Error;

/// Failure of a client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was disconnected (or never connected).
    #[error("WebSocket not connected")]
    NotConnected,

    /// Transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A message could not be encoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ClientError>;
