//! Health snapshot for the admin `health/check` verb.

use std::time::Instant;

use pulse_core::StoreCounts;
use serde::Serialize;
use serde_json::Value;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"success"` while the process is serving.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Authenticated sockets.
    pub sockets: usize,
    /// Connected sockets that have not authenticated yet.
    #[serde(rename = "preAuthSockets")]
    pub pre_auth_sockets: usize,
    /// Long-lived channels.
    pub channels: usize,
    /// uids currently considered online.
    #[serde(rename = "onlineUsers")]
    pub online_users: usize,
    /// Queued content tokens: channel → token → payload.
    #[serde(rename = "contentTokens")]
    pub content_tokens: Value,
}

/// Build a health response from live counters.
pub fn health_snapshot(
    start_time: Instant,
    counts: StoreCounts,
    content_tokens: Value,
) -> HealthResponse {
    HealthResponse {
        status: "success".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: start_time.elapsed().as_secs(),
        sockets: counts.authenticated,
        pre_auth_sockets: counts.pre_auth,
        channels: counts.channels,
        online_users: counts.online_users,
        content_tokens,
    }
}
