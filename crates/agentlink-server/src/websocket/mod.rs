//! WebSocket endpoint: connection state, per-connection session bridge,
//! event forwarding, and resource registration.

pub mod bridge;
pub mod connection;
pub mod forwarder;
pub mod registry;
pub mod resource;
pub mod session;
