//! Admin control-plane surface.
//!
//! Every route is gated by the shared-service-key middleware; routes
//! registered by extensions with `auth=false` mount outside this router.
//! Unknown paths under the admin prefix reply `404 Not Found.` — but only
//! after the key check, so probing the route space requires the key.

mod channels;
mod publish;
mod system;
mod tokens;
mod users;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::server::AppState;

/// Header carrying the shared service key.
pub const SERVICE_KEY_HEADER: &str = "NodejsServiceKey";

/// Build the admin router, gated by the service-key middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/publish", post(publish::publish))
        .route("/user/kick/{uid}", post(users::kick_user))
        .route("/user/logout/{auth_token}", post(users::logout_user))
        .route(
            "/user/channel/add/{channel}/{uid}",
            post(users::add_user_to_channel),
        )
        .route(
            "/user/channel/remove/{channel}/{uid}",
            post(users::remove_user_from_channel),
        )
        .route(
            "/user/presence-list/{uid}/{uid_list}",
            get(users::set_presence_list),
        )
        .route("/channel/add/{channel}", post(channels::add_channel))
        .route("/channel/check/{channel}", get(channels::check_channel))
        .route("/channel/remove/{channel}", post(channels::remove_channel))
        .route(
            "/authtoken/channel/add/{channel}/{auth_token}",
            post(channels::add_auth_token_to_channel),
        )
        .route(
            "/authtoken/channel/remove/{channel}/{auth_token}",
            post(channels::remove_auth_token_from_channel),
        )
        .route("/content/token", post(tokens::set_content_token))
        .route("/content/token/users", post(tokens::content_token_users))
        .route(
            "/content/token/message",
            post(tokens::publish_to_content_channel),
        )
        .route("/health/check", get(system::health_check))
        .route("/debug/toggle", post(system::toggle_debug))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_service_key,
        ))
        .with_state(state)
}

/// Reject requests whose `NodejsServiceKey` header does not match.
///
/// The mismatch reply is HTTP 200 with an error body, matching the wire
/// contract the backend expects.
async fn require_service_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.backend.check_service_key(presented) {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "admin request rejected: invalid service key");
        Json(json!({"error": "Invalid service key."})).into_response()
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found.").into_response()
}

/// `{"status": "success"}`
pub(crate) fn success() -> Json<Value> {
    Json(json!({"status": "success"}))
}

/// `{"status": "failed", "error": …}`
pub(crate) fn failed(error: &str) -> Json<Value> {
    Json(json!({"status": "failed", "error": error}))
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;
    use std::time::Instant;

    use pulse_core::{EventBus, StateStore};

    use crate::backend::BackendClient;
    use crate::config::{BackendConfig, GatewayConfig};
    use crate::logging::LogControl;
    use crate::server::AppState;
    use crate::session::SessionManager;
    use crate::shutdown::ShutdownCoordinator;

    /// App state over an unreachable backend, keyed with `secret`.
    pub fn make_state(service_key: &str) -> AppState {
        let config = GatewayConfig {
            service_key: service_key.into(),
            offline_grace_ms: 40,
            backend: BackendConfig {
                host: "127.0.0.1".into(),
                port: 9,
                ..BackendConfig::default()
            },
            ..GatewayConfig::default()
        };
        let backend =
            Arc::new(BackendClient::new(&config.backend, &config.service_key).unwrap());
        let store = Arc::new(StateStore::new());
        let manager = SessionManager::new(
            store.clone(),
            backend.clone(),
            Arc::new(EventBus::new()),
            &config,
        );
        let shutdown = Arc::new(ShutdownCoordinator::new(store.clone(), &config));
        AppState {
            manager,
            store,
            backend,
            config,
            log_control: Arc::new(LogControl::disabled()),
            metrics_handle: Arc::new(
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle(),
            ),
            start_time: Instant::now(),
            shutdown,
        }
    }
}
