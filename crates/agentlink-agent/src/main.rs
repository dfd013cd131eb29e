//! # agentlink-agent
//!
//! agentlink server binary: loads settings, starts the in-process agent pool,
//! and serves it over the agent WebSocket.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use agentlink_core::AgentTeam;
use agentlink_core::logging::{LogFormat, init_subscriber};
use agentlink_runtime::LocalAgentTeam;
use agentlink_server::{AgentApiResource, AgentLinkServer, ServerConfig};
use agentlink_settings::AgentLinkSettings;
use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;

/// agentlink agent server.
#[derive(Parser, Debug)]
#[command(name = "agentlink-agent", about = "agentlink agent server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.agentlink/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut AgentLinkSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Build the agent pool and a server serving it.
async fn build_server(
    settings: &AgentLinkSettings,
    metrics: Option<PrometheusHandle>,
) -> Result<(AgentLinkServer, Arc<LocalAgentTeam>)> {
    let team = Arc::new(
        LocalAgentTeam::with_builtin_templates().with_event_buffer(settings.agents.event_buffer),
    );
    for agent_type in &settings.agents.spawn_on_start {
        let agent = team
            .spawn_agent(agent_type)
            .await
            .with_context(|| format!("Failed to spawn startup agent '{agent_type}'"))?;
        tracing::info!(agent_id = agent.id(), name = agent.name(), "startup agent spawned");
    }

    let mut server = AgentLinkServer::new(ServerConfig::from(&settings.server));
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }
    let api_team: Arc<dyn AgentTeam> = team.clone();
    server.register_resource(Arc::new(AgentApiResource::new(api_team)));
    Ok((server, team))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(agentlink_settings::settings_path);
    let mut settings = agentlink_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    let format = LogFormat::parse(&settings.logging.format).unwrap_or_default();
    init_subscriber(&settings.logging.level, format);

    let metrics = match agentlink_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let (server, team) = build_server(&settings, metrics).await?;
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        "agentlink listening on ws://{addr}{} ({} agents running)",
        server.config().ws_path,
        team.len()
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    team.shutdown_all().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["agentlink-agent"]);
        let mut settings = AgentLinkSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, AgentLinkSettings::default());
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "agentlink-agent",
            "--host",
            "0.0.0.0",
            "--port",
            "0",
            "--log-level",
            "debug",
            "--settings",
            "/tmp/agentlink.json",
        ]);
        let mut settings = AgentLinkSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/agentlink.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["agentlink-agent", "--port", "70000"]).is_err());
    }

    #[tokio::test]
    async fn startup_agents_are_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 0}, "agents": {"spawnOnStart": ["chat", "approval", "chat"]}}"#,
        )
        .unwrap();
        let settings = agentlink_settings::loader::load_file_layer(&path).unwrap();

        let (_server, team) = build_server(&settings, None).await.unwrap();
        let names: Vec<String> = team.list_agents().into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["chat-1", "approval-1", "chat-2"]);
    }

    #[tokio::test]
    async fn unknown_startup_agent_fails() {
        let mut settings = AgentLinkSettings::default();
        settings.agents.spawn_on_start = vec!["nope".into()];
        let Err(err) = build_server(&settings, None).await else {
            panic!("expected error");
        };
        assert!(format!("{err:#}").contains("Unknown agent type: nope"));
    }

    #[tokio::test]
    async fn server_starts_and_reports_health() {
        let mut settings = AgentLinkSettings::default();
        settings.server.port = 0;
        let (server, team) = build_server(&settings, None).await.unwrap();
        let (addr, handle) = server.listen().await.unwrap();

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server
            .shutdown()
            .graceful_shutdown(vec![handle], Some(std::time::Duration::from_secs(5)))
            .await;
        team.shutdown_all().await;
    }
}
