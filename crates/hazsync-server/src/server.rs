//! `HazsyncServer` — Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use hazsync_engine::CollabEngine;
use hazsync_engine::publisher::EventPublisher;
use hazsync_store::CollabStore;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::rpc::context::RpcContext;
use crate::rpc::handlers::build_registry;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Per-connection context template (no caller bound).
    pub base_ctx: RpcContext,
    /// Live connection registry.
    pub connections: Arc<ConnectionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
    /// Prometheus render handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The hazsync collaboration server.
pub struct HazsyncServer {
    state: AppState,
    publisher: Arc<EventPublisher>,
}

impl HazsyncServer {
    /// Assemble a server over an engine and its store.
    pub fn new(config: ServerConfig, engine: &CollabEngine, store: Arc<CollabStore>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let base_ctx = RpcContext {
            sessions: Arc::clone(&engine.registry),
            presence: Arc::clone(&engine.presence),
            coordinator: Arc::clone(&engine.coordinator),
            aggregator: Arc::clone(&engine.aggregator),
            store,
            connections: Arc::clone(&connections),
            caller: None,
            server_start_time: Instant::now(),
        };
        let state = AppState {
            registry: Arc::new(build_registry()),
            base_ctx,
            connections,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            config,
            metrics: None,
        };
        Self {
            state,
            publisher: Arc::clone(&engine.publisher),
        }
    }

    /// Attach an installed Prometheus recorder handle; enables `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Get the connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.state.connections
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.state.registry
    }

    /// Spawn the event bridge draining engine events into the fan-out.
    pub fn spawn_event_bridge(&self) -> tokio::task::JoinHandle<()> {
        let bridge = EventBridge::new(
            self.publisher.subscribe(),
            Arc::clone(&self.state.connections),
        );
        tokio::spawn(bridge.run())
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let bridge = self.spawn_event_bridge();

        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, "hazsync server listening");

        let token = self.state.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        self.state
            .shutdown
            .graceful_shutdown(vec![bridge], Some(Duration::from_secs(5)))
            .await;
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.connection_count();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics — Prometheus text format, when a recorder is installed.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(ref handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Query parameters accepted on the WebSocket upgrade.
#[derive(Debug, Deserialize)]
struct WsQuery {
    /// Authenticated user for this connection. Token verification happens
    /// upstream (external auth collaborator); this server receives the
    /// resolved identity.
    user: Option<String>,
}

/// GET /ws — WebSocket upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.connections.connection_count() >= state.config.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let client_id = format!("conn_{}", Uuid::now_v7());
    let heartbeat_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                client_id,
                query.user,
                Arc::clone(&state.registry),
                state.base_ctx.clone(),
                Arc::clone(&state.connections),
                heartbeat_interval,
                heartbeat_timeout,
                state.shutdown.token(),
            )
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hazsync_engine::collaborators::Collaborators;
    use hazsync_settings::EmptySessionPolicy;
    use tower::ServiceExt;

    fn make_server() -> HazsyncServer {
        let store = Arc::new(CollabStore::in_memory().unwrap());
        let engine = CollabEngine::new(
            Arc::clone(&store),
            Collaborators::store_backed(Arc::clone(&store)),
            EmptySessionPolicy::Keep,
        );
        HazsyncServer::new(ServerConfig::default(), &engine, store)
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
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        // Not a 404: the route exists but plain GET is not a WebSocket
        // handshake.
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
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
    async fn registry_has_methods() {
        let server = make_server();
        assert!(server.registry().has_method("session.join"));
        assert!(server.registry().has_method("entry.update"));
    }

    #[tokio::test]
    async fn event_bridge_spawns_and_exits_on_shutdown() {
        let server = make_server();
        let handle = server.spawn_event_bridge();
        // Bridge is alive until the publisher drops with the engine; abort
        // here to keep the test self-contained.
        handle.abort();
        let _ = handle.await;
    }

    #[test]
    fn shutdown_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
