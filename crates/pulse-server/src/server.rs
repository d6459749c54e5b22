//! `GatewayServer` — axum HTTP + WebSocket assembly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_core::StateStore;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, instrument, warn};

use crate::admin;
use crate::backend::BackendClient;
use crate::config::GatewayConfig;
use crate::logging::LogControl;
use crate::session::SessionManager;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_ws_session;

/// Generates UUIDv7 request ids.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session engine.
    pub manager: SessionManager,
    /// Shared state store.
    pub store: Arc<StateStore>,
    /// Backend client (also the service-key validator).
    pub backend: Arc<BackendClient>,
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Live log-level control.
    pub log_control: Arc<LogControl>,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: Arc<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// The gateway server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Assemble a server over an existing session engine.
    pub fn new(
        config: GatewayConfig,
        manager: SessionManager,
        backend: Arc<BackendClient>,
        log_control: Arc<LogControl>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let store = manager.store().clone();
        let shutdown = Arc::new(ShutdownCoordinator::new(store.clone(), &config));
        Self {
            state: AppState {
                manager,
                store,
                backend,
                config,
                log_control,
                metrics_handle: Arc::new(metrics_handle),
                start_time: Instant::now(),
                shutdown,
            },
        }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let admin_routes = admin::router(state.clone());
        let prefix = state.config.admin_prefix();

        Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .nest(&prefix, admin_routes)
            .fallback(not_found_handler)
            // Outermost layers run first on the request.
            .layer(CatchPanicLayer::new())
            .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB
            .layer(TimeoutLayer::new(Duration::from_secs(30)))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Bind and serve. Returns the bound address and the server task handle.
    #[instrument(skip_all, fields(host = %self.state.config.host, port = self.state.config.port))]
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, prefix = %self.state.config.admin_prefix(), "gateway started");

        let router = self.router();
        let shutdown_token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    /// Shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }
}

/// GET `/ws` — upgrade, bounded by `max_connections`.
async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let counts = state.store.counts();
    let current = counts.pre_auth + counts.authenticated;
    if current >= state.config.max_connections {
        warn!(
            current,
            max = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let client_id = uuid::Uuid::now_v7().to_string();
    let manager = state.manager.clone();
    let interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);

    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, client_id, manager, interval, timeout)
        }))
}

/// GET `/metrics` — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::test_helpers::make_state;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> GatewayServer {
        let state = make_state("__LOL_TESTING__");
        GatewayServer {
            state,
        }
    }

    #[tokio::test]
    async fn unknown_route_is_404_not_found() {
        let app = make_server().router();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"Not Found.");
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let app = make_server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade_headers() {
        let app = make_server().router();
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_are_nested_under_prefix() {
        let app = make_server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nodejs/channel/check/news")
                    .header("NodejsServiceKey", "__LOL_TESTING__")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn admin_root_without_key_reports_invalid_key() {
        let app = make_server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nodejs/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid service key.");
    }

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let state = make_state("");
        let server = GatewayServer {
            state: AppState {
                config: GatewayConfig {
                    host: "127.0.0.1".into(),
                    port: 0,
                    ..state.config.clone()
                },
                ..state
            },
        };
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }
}
