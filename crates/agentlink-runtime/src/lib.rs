//! # agentlink-runtime
//!
//! In-process agent pool. [`LocalAgentTeam`] implements
//! [`AgentTeam`](agentlink_core::AgentTeam) over [`LocalAgent`]s, each of
//! which runs an [`AgentTemplate`] on its own worker task and publishes what
//! it does through a broadcast [`EventEmitter`].

#![deny(unsafe_code)]

pub mod agent;
pub mod emitter;
pub mod team;
pub mod template;

pub use agent::{AgentContext, LocalAgent};
pub use emitter::EventEmitter;
pub use team::LocalAgentTeam;
pub use template::{AgentTemplate, ApprovalTemplate, ChatTemplate};
