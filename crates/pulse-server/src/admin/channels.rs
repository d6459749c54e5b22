//! Channel-scoped admin verbs.

use axum::extract::{Path, State};
use axum::Json;
use pulse_core::validate;
use serde_json::{json, Value};

use crate::server::AppState;

use super::{failed, success};

/// POST `channel/add/{channel}` — create; fails when it already exists.
pub async fn add_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    if state.store.add_channel(&channel) {
        success()
    } else {
        failed("channel already exists")
    }
}

/// GET `channel/check/{channel}`.
pub async fn check_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    Json(json!({
        "status": "success",
        "result": state.store.channel_exists(&channel),
    }))
}

/// POST `channel/remove/{channel}` — delete; fails when absent.
pub async fn remove_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    if state.store.remove_channel(&channel) {
        success()
    } else {
        failed("channel not found")
    }
}

/// POST `authtoken/channel/add/{channel}/{auth_token}`.
pub async fn add_auth_token_to_channel(
    State(state): State<AppState>,
    Path((channel, auth_token)): Path<(String, String)>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    if state.manager.add_auth_token_to_channel(&channel, &auth_token) {
        success()
    } else {
        failed("unknown auth token")
    }
}

/// POST `authtoken/channel/remove/{channel}/{auth_token}`.
pub async fn remove_auth_token_from_channel(
    State(state): State<AppState>,
    Path((channel, auth_token)): Path<(String, String)>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    if state
        .manager
        .remove_auth_token_from_channel(&channel, &auth_token)
    {
        success()
    } else {
        failed("channel not found")
    }
}
