//! `WsServer` — the axum WebSocket server wired to a heartbeat supervisor.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use vigil_core::peer::ConnectionSet;
use vigil_core::Supervisor;

use crate::config::ServerConfig;
use crate::connection::WsConnection;
use crate::errors::Result;
use crate::health::{self, HealthResponse};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_REJECTED_TOTAL, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The live connection set.
    pub registry: Arc<ConnectionRegistry>,
    /// Heartbeat supervisor over the registry.
    pub supervisor: Arc<Supervisor>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// Handle rendering the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
    /// Server configuration.
    pub config: ServerConfig,
    /// When the server was created.
    pub started_at: Instant,
}

/// WebSocket server with heartbeat supervision.
pub struct WsServer {
    state: AppState,
}

impl WsServer {
    /// Build a server from `config`.
    ///
    /// Fails if the heartbeat timing cannot drive the supervisor's timers.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.heartbeat.validate()?;

        let shutdown = ShutdownCoordinator::new();
        let registry = Arc::new(ConnectionRegistry::new(shutdown.token()));
        let supervisor = Arc::new(Supervisor::new(
            config.heartbeat.clone(),
            Arc::clone(&registry) as Arc<dyn ConnectionSet>,
        ));
        let metrics = crate::metrics::install_recorder();

        Ok(Self {
            state: AppState {
                registry,
                supervisor,
                shutdown,
                metrics,
                config,
                started_at: Instant::now(),
            },
        })
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind the listener, start serving, and arm heartbeat supervision.
    ///
    /// Returns the bound address and the serve task's handle. The task
    /// exits after a graceful shutdown completes.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let bind = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;
        self.state.registry.set_accepting(true);

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let shutdown_signal = async move { token.cancelled().await };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal)
                .await
            {
                error!(error = %err, "server error");
            }
        });

        // Accepting is true now, so this arms rather than no-ops.
        self.state.supervisor.start();
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Signal shutdown, kick any sockets still attached, and wait for the
    /// given task handles (bounded by `timeout`).
    pub async fn shutdown_and_wait(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        self.state.shutdown.shutdown();
        self.state.registry.close_all();
        self.state.shutdown.shutdown_and_wait(handles, timeout).await;
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// The live connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// The heartbeat supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.state.supervisor
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.state.shutdown
    }
}

/// GET /ws — upgrade to a WebSocket session.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.registry.count() >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            limit = state.config.max_connections,
            "rejecting connection, server full"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// Run one client socket from upgrade to disconnect.
///
/// The writer task drains the outbound channel (probes included) and
/// watches the kill and shutdown tokens. The reader echoes text frames,
/// turns Pong frames into probe-response notifications, and exits on
/// close, error, kill, or shutdown.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = format!("conn_{}", Uuid::now_v7());
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(state.config.outbound_buffer);
    let conn = Arc::new(WsConnection::new(conn_id.clone(), out_tx));
    state.registry.add(Arc::clone(&conn));

    let connection_start = Instant::now();
    info!(conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let hello = serde_json::json!({
        "type": "connection.ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": {
            "connId": conn_id,
            "probeIntervalMs": state.config.heartbeat.probe_interval_ms,
            "responseTimeoutMs": state.config.heartbeat.response_timeout_ms,
        },
    });
    if let Ok(json) = serde_json::to_string(&hello) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    let kill = conn.kill_signal();
    let shutdown = state.shutdown.token();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = out_rx.recv() => {
                    match maybe {
                        Some(message) => {
                            if ws_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                () = kill.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let kill = conn.kill_signal();
    let shutdown = state.shutdown.token();
    loop {
        tokio::select! {
            maybe = ws_rx.next() => {
                match maybe {
                    Some(Ok(Message::Text(text))) => {
                        // Demo application semantics: echo text frames.
                        if !conn.send_text(text.to_string()) {
                            debug!(conn_id, "echo dropped, outbound channel full");
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            let _ = conn.send_text(text.to_string());
                        } else {
                            info!(conn_id, len = data.len(), "ignoring non-UTF8 binary frame");
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        trace!(conn_id, "probe response");
                        conn.notify_response();
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Answered by the protocol layer; a client ping is
                        // not a probe response.
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(conn_id, "client sent close frame");
                        break;
                    }
                    Some(Err(err)) => {
                        debug!(conn_id, error = %err, "socket error");
                        break;
                    }
                    None => break,
                }
            }
            () = kill.cancelled() => break,
            () = shutdown.cancelled() => break,
        }
    }

    conn.mark_closed();
    let _ = state.registry.remove(&conn_id);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    writer.abort();
    info!(conn_id, "client disconnected");
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.started_at.elapsed().as_secs(),
        state.registry.count(),
        state.supervisor.tracked_connections(),
        state.supervisor.is_running(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use vigil_core::SupervisorConfig;

    use super::*;

    fn make_server() -> WsServer {
        WsServer::new(ServerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.registry().count(), 0);
        assert!(!server.supervisor().is_running());
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        let config = ServerConfig {
            heartbeat: SupervisorConfig {
                probe_interval_ms: 0,
                ..SupervisorConfig::default()
            },
            ..ServerConfig::default()
        };
        assert!(WsServer::new(config).is_err());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["supervised"], 0);
        assert_eq!(parsed["supervising"], false);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_is_mounted() {
        let server = make_server();
        let app = server.router();

        // No upgrade headers: the extractor rejects, but the route exists.
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_server_rejects_upgrade() {
        let config = ServerConfig {
            max_connections: 0,
            ..ServerConfig::default()
        };
        let server = WsServer::new(config).unwrap();
        let app = server.router();

        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn shutdown_propagates_to_coordinator() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn custom_config_is_kept() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            max_connections: 10,
            ..ServerConfig::default()
        };
        let server = WsServer::new(config).unwrap();
        assert_eq!(server.config().host, "0.0.0.0");
        assert_eq!(server.config().port, 9090);
        assert_eq!(server.config().max_connections, 10);
    }
}
