//! The `publish` verb: broadcast or channel fan-out.

use axum::extract::State;
use axum::Json;
use metrics::counter;
use pulse_core::GatewayEvent;
use serde_json::{json, Value};

use crate::metrics as metric_names;
use crate::server::AppState;

use super::failed;

/// POST `publish` — body `{channel?, broadcast?, …}`.
///
/// `broadcast: true` fans out to every authenticated socket, otherwise the
/// message goes to the members of `channel`. The delivered count is
/// reported; delivery is best-effort.
pub async fn publish(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let broadcast = body
        .get("broadcast")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let sent = if broadcast {
        state.manager.broadcast(&body)
    } else {
        match state.manager.publish_to_channel(&body) {
            Some(sent) => sent,
            None => return failed("message requires a channel or the broadcast flag"),
        }
    };

    counter!(metric_names::MESSAGES_PUBLISHED_TOTAL).increment(1);
    state
        .manager
        .bus()
        .emit(&GatewayEvent::MessagePublished { message: body });
    Json(json!({"status": "success", "sent": sent}))
}
