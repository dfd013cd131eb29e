//! # agentlink-server
//!
//! Axum HTTP + `WebSocket` host for the agent session bridge.
//!
//! - HTTP endpoints: `/health`, `/metrics`
//! - Resources: [`websocket::resource::WebResource`] implementations mounted at
//!   startup; [`AgentApiResource`] serves the agent protocol
//! - Per-connection [`SessionBridge`]: command dispatch, one forwarding task
//!   at a time, cancellation on resubscribe and close
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::AgentLinkServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::bridge::{CommandError, SessionBridge};
pub use websocket::resource::{AgentApiResource, ResourceHost, WebResource};
