//! In-memory agent registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agentlink_core::{AgentError, AgentHandle, AgentSummary, AgentTeam};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::agent::LocalAgent;
use crate::emitter::DEFAULT_CAPACITY;
use crate::template::{AgentTemplate, ApprovalTemplate, ChatTemplate};

/// Agent pool backed by in-process [`LocalAgent`]s.
pub struct LocalAgentTeam {
    templates: HashMap<String, Arc<dyn AgentTemplate>>,
    agents: DashMap<String, Arc<LocalAgent>>,
    name_counters: Mutex<HashMap<String, u64>>,
    created: AtomicU64,
    event_buffer: usize,
}

impl LocalAgentTeam {
    /// Create an empty team with no templates.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            agents: DashMap::new(),
            name_counters: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            event_buffer: DEFAULT_CAPACITY,
        }
    }

    /// Create a team with the `chat` and `approval` templates registered.
    pub fn with_builtin_templates() -> Self {
        Self::new()
            .with_template(Arc::new(ChatTemplate))
            .with_template(Arc::new(ApprovalTemplate))
    }

    /// Register a template under its type tag, replacing any previous one.
    #[must_use]
    pub fn with_template(mut self, template: Arc<dyn AgentTemplate>) -> Self {
        let _ = self
            .templates
            .insert(template.agent_type().to_owned(), template);
        self
    }

    /// Set the per-agent event channel capacity.
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Registered type tags, sorted.
    pub fn template_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.templates.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the team has no live agents.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Shut down and remove every agent.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, agent)) = self.agents.remove(&id) {
                agent.shutdown().await;
            }
        }
    }

    fn next_name(&self, agent_type: &str) -> String {
        let mut counters = self.name_counters.lock();
        let counter = counters.entry(agent_type.to_owned()).or_insert(0);
        *counter += 1;
        format!("{agent_type}-{counter}")
    }
}

impl Default for LocalAgentTeam {
    fn default() -> Self {
        Self::with_builtin_templates()
    }
}

#[async_trait]
impl AgentTeam for LocalAgentTeam {
    fn list_agents(&self) -> Vec<AgentSummary> {
        let mut agents: Vec<Arc<LocalAgent>> =
            self.agents.iter().map(|e| Arc::clone(e.value())).collect();
        agents.sort_by_key(|a| a.created_seq());
        agents.iter().map(|a| AgentSummary::of(a.as_ref())).collect()
    }

    fn get_agent(&self, id: &str) -> Option<Arc<dyn AgentHandle>> {
        self.agents
            .get(id)
            .map(|e| Arc::clone(e.value()) as Arc<dyn AgentHandle>)
    }

    #[instrument(skip(self))]
    async fn spawn_agent(&self, agent_type: &str) -> Result<Arc<dyn AgentHandle>, AgentError> {
        let template = self
            .templates
            .get(agent_type)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgentType(agent_type.to_owned()))?;

        let id = Uuid::now_v7().to_string();
        let name = self.next_name(agent_type);
        let seq = self.created.fetch_add(1, Ordering::Relaxed);
        let agent = LocalAgent::start(id.clone(), name.clone(), template, seq, self.event_buffer);
        let _ = self.agents.insert(id.clone(), Arc::clone(&agent));

        info!(agent_id = %id, name = %name, "agent spawned");
        Ok(agent)
    }

    #[instrument(skip_all, fields(agent_id = agent.id()))]
    async fn delete_agent(&self, agent: &Arc<dyn AgentHandle>) -> Result<(), AgentError> {
        let (_, local) = self
            .agents
            .remove(agent.id())
            .ok_or_else(|| AgentError::NotFound(agent.id().to_owned()))?;
        local.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_assigns_sequential_names_per_type() {
        let team = LocalAgentTeam::with_builtin_templates();
        let a = team.spawn_agent("chat").await.unwrap();
        let b = team.spawn_agent("chat").await.unwrap();
        let c = team.spawn_agent("approval").await.unwrap();

        assert_eq!(a.name(), "chat-1");
        assert_eq!(b.name(), "chat-2");
        assert_eq!(c.name(), "approval-1");
        assert_ne!(a.id(), b.id());
        assert_eq!(c.agent_type(), "approval");
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let team = LocalAgentTeam::with_builtin_templates();
        let Err(err) = team.spawn_agent("nope").await else {
            panic!("expected error");
        };
        assert_eq!(err.to_string(), "Unknown agent type: nope");
        assert!(team.is_empty());
    }

    #[tokio::test]
    async fn list_is_in_creation_order() {
        let team = LocalAgentTeam::with_builtin_templates();
        for _ in 0..5 {
            let _ = team.spawn_agent("chat").await.unwrap();
        }
        let names: Vec<String> = team.list_agents().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["chat-1", "chat-2", "chat-3", "chat-4", "chat-5"]);
    }

    #[tokio::test]
    async fn get_and_delete() {
        let team = LocalAgentTeam::with_builtin_templates();
        let agent = team.spawn_agent("chat").await.unwrap();
        let id = agent.id().to_owned();

        assert!(team.get_agent(&id).is_some());
        team.delete_agent(&agent).await.unwrap();
        assert!(team.get_agent(&id).is_none());
        assert!(team.list_agents().is_empty());

        let err = team.delete_agent(&agent).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn names_are_not_reused_after_delete() {
        let team = LocalAgentTeam::with_builtin_templates();
        let first = team.spawn_agent("chat").await.unwrap();
        team.delete_agent(&first).await.unwrap();
        let second = team.spawn_agent("chat").await.unwrap();
        assert_eq!(second.name(), "chat-2");
    }

    #[tokio::test]
    async fn shutdown_all_empties_team() {
        let team = LocalAgentTeam::with_builtin_templates().with_event_buffer(8);
        let _ = team.spawn_agent("chat").await.unwrap();
        let _ = team.spawn_agent("approval").await.unwrap();
        assert_eq!(team.len(), 2);

        team.shutdown_all().await;
        assert!(team.is_empty());
    }

    #[test]
    fn builtin_template_types() {
        let team = LocalAgentTeam::default();
        assert_eq!(team.template_types(), ["approval", "chat"]);
    }
}
