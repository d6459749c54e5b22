//! Authenticated identity records returned by the backend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the backend said about an auth token.
///
/// Backend responses are schemaless JSON: the fields the gateway acts on are
/// typed below, and every unknown key rides in `attachments` so it
/// round-trips unchanged to event-bus subscribers and the
/// `clientAuthenticated` callback.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthIdentity {
    /// Opaque token identifying the logged-in browser session.
    pub auth_token: String,

    /// Backend user id; 0 means anonymous.
    pub uid: u64,

    /// Channels this user may join, in backend order.
    pub channels: Vec<String>,

    /// Whether the backend accepted the token.
    pub nodejs_valid_auth_token: bool,

    /// uids allowed to observe this user's presence changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_uids: Option<Vec<u64>>,

    /// Token-channel name → one-use content token to redeem on connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_tokens: Option<HashMap<String, String>>,

    /// Socket id the backend echoes back during authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Unknown backend keys, preserved verbatim.
    #[serde(flatten)]
    pub attachments: serde_json::Map<String, Value>,
}

impl AuthIdentity {
    /// True for a logged-in (non-anonymous) user.
    pub fn is_logged_in(&self) -> bool {
        self.uid > 0
    }
}
