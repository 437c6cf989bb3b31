//! Prometheus metrics recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, info};

/// Install the Prometheus metrics recorder.
///
/// Only the first call in a process can claim the global recorder slot.
/// Later callers (a second server in the same process, tests) get a
/// standalone recorder whose handle renders only what that recorder saw.
#[must_use]
pub fn install_recorder() -> PrometheusHandle {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("prometheus metrics recorder installed");
            handle
        }
        Err(err) => {
            debug!(%err, "global metrics recorder taken, using a local one");
            PrometheusBuilder::new().build_recorder().handle()
        }
    }
}

/// Render Prometheus text format from `handle`.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades rejected because the server was full (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Outbound messages dropped on a full channel (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Liveness probes enqueued (counter).
pub const HEARTBEAT_PROBES_TOTAL: &str = "heartbeat_probes_total";
/// Probe responses observed (counter).
pub const HEARTBEAT_RESPONSES_TOTAL: &str = "heartbeat_responses_total";
/// Connections terminated for silence (counter).
pub const HEARTBEAT_TERMINATIONS_TOTAL: &str = "heartbeat_terminations_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Standalone recorder, no global install to avoid test conflicts.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTIONS_REJECTED_TOTAL,
            WS_OUTBOUND_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            HEARTBEAT_PROBES_TOTAL,
            HEARTBEAT_RESPONSES_TOTAL,
            HEARTBEAT_TERMINATIONS_TOTAL,
        ];
        for name in names {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
