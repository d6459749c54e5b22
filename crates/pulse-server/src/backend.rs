//! Outbound HTTP to the CMS backend, and the shared-service-key gate.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::BackendConfig;

/// HTTP request timeout for backend calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the backend message endpoint.
///
/// One endpoint, one verb: a form-encoded POST carrying the JSON message and
/// the shared service key. Requests are never retried; callers decide what a
/// failure means.
pub struct BackendClient {
    http: reqwest::Client,
    message_url: String,
    service_key: String,
    basic_auth: Option<(String, String)>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("message_url", &self.message_url)
            .finish_non_exhaustive()
    }
}

/// Status and raw body of a backend reply.
#[derive(Clone, Debug)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
}

/// Backend client errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Failed to build the HTTP client at startup.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
    /// The request did not produce an HTTP response.
    #[error("backend request failed: {reason}")]
    Transport { reason: String },
}

impl BackendClient {
    /// Build a client for the configured backend.
    ///
    /// When the backend scheme is HTTPS and `strict_ssl` is off, certificate
    /// verification is disabled.
    pub fn new(config: &BackendConfig, service_key: &str) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if config.scheme == "https" && !config.strict_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().map_err(|e| BackendError::ClientBuild {
            reason: e.to_string(),
        })?;

        let message_url = config.message_url();
        info!(url = %message_url, "backend client initialized");

        Ok(Self {
            http,
            message_url,
            service_key: service_key.to_owned(),
            basic_auth: config.basic_auth(),
        })
    }

    /// POST a message envelope to the backend.
    ///
    /// The body is `application/x-www-form-urlencoded` with `messageJson`
    /// (the JSON-encoded message) and `serviceKey`.
    pub async fn send_message(&self, message: &Value) -> Result<BackendReply, BackendError> {
        let message_json =
            serde_json::to_string(message).map_err(|e| BackendError::Transport {
                reason: e.to_string(),
            })?;

        let mut request = self.http.post(&self.message_url).form(&[
            ("messageJson", message_json.as_str()),
            ("serviceKey", self.service_key.as_str()),
        ]);
        if let Some((user, pass)) = &self.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| BackendError::Transport {
            reason: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| BackendError::Transport {
            reason: e.to_string(),
        })?;

        debug!(status, url = %self.message_url, "backend reply");
        Ok(BackendReply { status, body })
    }

    /// Validate a presented service key in constant time.
    ///
    /// When no key is configured every caller is accepted.
    pub fn check_service_key(&self, presented: &str) -> bool {
        if self.service_key.is_empty() {
            return true;
        }
        constant_time_eq(presented.as_bytes(), self.service_key.as_bytes())
    }
}

/// Constant-time byte comparison: XOR accumulated across equal positions so
/// the running time does not depend on where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc: u8 = 0;
    for (x, y) in a.iter().zip(b) {
        acc |= x ^ y;
    }
    acc == 0
}
