//! Web resources mounted on the server router.

use std::sync::Arc;

use agentlink_core::AgentTeam;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use super::registry::ConnectionRegistry;
use super::session::{SessionContext, run_ws_session};
use crate::config::ServerConfig;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;

/// What the server hands a resource when it is installed.
#[derive(Clone)]
pub struct ResourceHost {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connection tracking.
    pub connections: Arc<ConnectionRegistry>,
    /// Shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// A set of routes installed on the server once, at startup.
pub trait WebResource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Add this resource's routes to `router`.
    fn register(&self, router: Router, host: &ResourceHost) -> Router;
}

/// Mounts the agent WebSocket endpoint at the configured path.
pub struct AgentApiResource {
    team: Arc<dyn AgentTeam>,
}

impl AgentApiResource {
    /// Serve agents from `team`.
    pub fn new(team: Arc<dyn AgentTeam>) -> Self {
        Self { team }
    }
}

#[derive(Clone)]
struct AgentApiState {
    team: Arc<dyn AgentTeam>,
    host: ResourceHost,
}

impl WebResource for AgentApiResource {
    fn name(&self) -> &str {
        "agent-api"
    }

    fn register(&self, router: Router, host: &ResourceHost) -> Router {
        info!(path = %host.config.ws_path, "registering agent websocket");
        let state = AgentApiState {
            team: Arc::clone(&self.team),
            host: host.clone(),
        };
        router.route(&host.config.ws_path, get(ws_handler).with_state(state))
    }
}

/// GET `<ws_path>`: upgrade to a WebSocket session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AgentApiState>) -> Response {
    let config = Arc::clone(&state.host.config);
    let active = state.host.connections.connection_count().await;
    if active >= config.max_connections {
        warn!(active, max = config.max_connections, "connection limit reached, rejecting upgrade");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let client_id = format!("client_{}", Uuid::now_v7().simple());
    let ctx = SessionContext {
        team: state.team,
        config: Arc::clone(&config),
        connections: Arc::clone(&state.host.connections),
        shutdown: state.host.shutdown.token(),
    };
    let shutdown = Arc::clone(&state.host.shutdown);

    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| shutdown.track_session(run_ws_session(socket, client_id, ctx)))
}
