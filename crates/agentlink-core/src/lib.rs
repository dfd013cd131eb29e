//! # agentlink-core
//!
//! Shared vocabulary for the agentlink bridge.
//!
//! - **Protocol**: [`protocol::ClientMessage`] / [`protocol::ServerMessage`], the
//!   closed sets of inbound commands and outbound replies
//! - **Events**: [`events::AgentEventEnvelope`], the opaque tagged payload an agent
//!   emits, plus the typed [`events::AgentEvent`] producers build it from
//! - **Collaborators**: [`agent::AgentTeam`] and [`agent::AgentHandle`], the registry
//!   and runtime interfaces the bridge consumes
//! - **Errors**: [`errors::AgentError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod agent;
pub mod errors;
pub mod events;
pub mod logging;
pub mod protocol;

pub use agent::{AgentEventStream, AgentHandle, AgentInput, AgentSummary, AgentTeam};
pub use errors::AgentError;
pub use events::{AgentEvent, AgentEventEnvelope, SystemLevel};
pub use protocol::{ClientMessage, ServerMessage};
