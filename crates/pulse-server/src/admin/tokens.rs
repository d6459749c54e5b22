//! Content-token admin verbs.

use axum::extract::State;
use axum::Json;
use metrics::counter;
use pulse_core::{validate, GatewayEvent};
use serde_json::{json, Value};

use crate::metrics as metric_names;
use crate::server::AppState;

use super::{failed, success};

/// POST `content/token` — body `{channel, token, …}`.
///
/// The whole body is stored as the token's metadata payload, so flags like
/// `notifyOnDisconnect` ride along.
pub async fn set_content_token(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let Some(channel) = body.get("channel").and_then(Value::as_str) else {
        return failed("missing channel");
    };
    if !validate::channel_name_ok(channel) {
        return failed("invalid channel name");
    }
    let Some(token) = body.get("token").and_then(Value::as_str) else {
        return failed("missing token");
    };
    state.store.set_content_token(channel, token, body.clone());
    success()
}

/// POST `content/token/users` — body `{channel}`.
///
/// Reports who redeemed into the token channel: uids for logged-in users,
/// auth tokens for anonymous sockets.
pub async fn content_token_users(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let Some(channel) = body.get("channel").and_then(Value::as_str) else {
        return failed("missing channel");
    };
    if !state.store.token_channel_exists(channel) {
        return failed("token channel not found");
    }

    let mut uids = Vec::new();
    let mut auth_tokens = Vec::new();
    for (session_id, _) in state.store.token_channel_sockets(channel) {
        if let Some((auth_token, uid)) = state.store.socket_identity(&session_id) {
            if uid > 0 {
                uids.push(uid);
            } else {
                auth_tokens.push(auth_token);
            }
        }
    }
    Json(json!({
        "status": "success",
        "uids": uids,
        "authTokens": auth_tokens,
    }))
}

/// POST `content/token/message` — body `{channel, …}`; fan out to the token
/// channel's sockets.
pub async fn publish_to_content_channel(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let Some(channel) = body.get("channel").and_then(Value::as_str) else {
        return failed("missing channel");
    };
    if !state.store.token_channel_exists(channel) {
        return failed("token channel not found");
    }

    let sent = state.manager.publish_to_token_channel(channel, &body);
    counter!(metric_names::MESSAGES_PUBLISHED_TOTAL).increment(1);
    state
        .manager
        .bus()
        .emit(&GatewayEvent::MessagePublished { message: body });
    Json(json!({"status": "success", "sent": sent}))
}
