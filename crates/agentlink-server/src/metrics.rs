//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the connection limit was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Client commands handled (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Client commands answered with an error (counter, labels: command).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Running forwarding tasks (gauge).
pub const FORWARDERS_ACTIVE: &str = "forwarders_active";
/// Agent events forwarded to clients (counter).
pub const EVENTS_FORWARDED_TOTAL: &str = "events_forwarded_total";
/// Forwarding tasks that ended on a stream error (counter).
pub const FORWARD_ERRORS_TOTAL: &str = "forward_errors_total";
