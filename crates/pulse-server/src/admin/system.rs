//! Health and live-debug admin verbs.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::health::{health_snapshot, HealthResponse};
use crate::server::AppState;

/// GET `health/check` — counts, the content-token snapshot, and version.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = health_snapshot(
        state.start_time,
        state.store.counts(),
        state.store.content_tokens_snapshot(),
    );
    Json(snapshot)
}

/// POST `debug/toggle` — optional body `{debug: bool}`; without a body the
/// current state flips.
pub async fn toggle_debug(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Json<Value> {
    let requested = body
        .as_ref()
        .and_then(|Json(v)| v.get("debug").and_then(Value::as_bool));
    let debug_enabled = requested.unwrap_or(!state.log_control.is_debug());
    state.log_control.set_debug(debug_enabled);
    info!(debug_enabled, "log level toggled");
    Json(json!({"status": "success", "debug": debug_enabled}))
}
