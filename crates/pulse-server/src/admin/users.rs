//! User-scoped admin verbs: kick, logout, channel membership, presence.

use axum::extract::{Path, State};
use axum::Json;
use pulse_core::validate;
use serde_json::Value;

use crate::server::AppState;

use super::{failed, success};

/// POST `user/kick/{uid}` — purge identities, close sockets, strip channels.
pub async fn kick_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Json<Value> {
    let Some(uid) = validate::parse_uid(&uid) else {
        return failed("invalid uid");
    };
    state.manager.kick_user(uid);
    success()
}

/// POST `user/logout/{auth_token}` — drop one identity and its sockets.
pub async fn logout_user(
    State(state): State<AppState>,
    Path(auth_token): Path<String>,
) -> Json<Value> {
    state.manager.logout_user(&auth_token);
    success()
}

/// POST `user/channel/add/{channel}/{uid}`.
pub async fn add_user_to_channel(
    State(state): State<AppState>,
    Path((channel, uid)): Path<(String, String)>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    let Some(uid) = validate::parse_uid(&uid) else {
        return failed("invalid uid");
    };
    if state.manager.add_user_to_channel(&channel, uid) {
        success()
    } else {
        failed("no active sessions for uid")
    }
}

/// POST `user/channel/remove/{channel}/{uid}`.
pub async fn remove_user_from_channel(
    State(state): State<AppState>,
    Path((channel, uid)): Path<(String, String)>,
) -> Json<Value> {
    if !validate::channel_name_ok(&channel) {
        return failed("invalid channel name");
    }
    let Some(uid) = validate::parse_uid(&uid) else {
        return failed("invalid uid");
    };
    if state.manager.remove_user_from_channel(&channel, uid) {
        success()
    } else {
        failed("channel not found")
    }
}

/// GET `user/presence-list/{uid}/{uid_list}` — replace the observer list.
///
/// `uid_list` is comma-separated; every entry must be a digit string.
pub async fn set_presence_list(
    State(state): State<AppState>,
    Path((uid, uid_list)): Path<(String, String)>,
) -> Json<Value> {
    let Some(uid) = validate::parse_uid(&uid) else {
        return failed("invalid uid");
    };
    let Some(observers) = validate::parse_uid_list(&uid_list) else {
        return failed("invalid uid list");
    };
    // Only online uids hold a presence list; for the rest this is a no-op.
    let _ = state.store.set_presence_list(uid, observers);
    success()
}
