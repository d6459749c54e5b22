//! Gateway configuration: defaults, JSON file loading, env overrides.
//!
//! Loading flow:
//! 1. Start with compiled defaults
//! 2. If a config file was given, parse it (missing fields keep defaults)
//! 3. Apply environment variable overrides (highest priority)

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` auto-assigns).
    pub port: u16,
    /// Path prefix for the admin control plane.
    pub base_auth_path: String,
    /// Shared secret required on every admin request. Empty disables the
    /// check.
    pub service_key: String,
    /// Whether channel-less client messages are relayed to extensions.
    pub clients_can_write_to_clients: bool,
    /// Grace period before offline/disconnect notifications fire.
    pub offline_grace_ms: u64,
    /// Maximum concurrent sockets.
    pub max_connections: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a socket after this long without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Window given to background work (grace timers, backend
    /// notifications) when the gateway drains at shutdown.
    pub shutdown_drain_secs: u64,
    /// Initial log level.
    pub log_level: String,
    /// Backend (control-plane origin) settings.
    pub backend: BackendConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            base_auth_path: "/nodejs/".into(),
            service_key: String::new(),
            clients_can_write_to_clients: false,
            offline_grace_ms: 2000,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024, // 1 MB
            shutdown_drain_secs: 10,
            log_level: "info".into(),
            backend: BackendConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// The admin route prefix, normalized for router nesting
    /// (leading slash, no trailing slash).
    pub fn admin_prefix(&self) -> String {
        let trimmed = self.base_auth_path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".into()
        } else if trimmed.starts_with('/') {
            trimmed.into()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Where and how to reach the content-management backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// `"http"` or `"https"`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path prefix on the backend.
    pub base_path: String,
    /// Message endpoint under `base_path`.
    pub message_path: String,
    /// Optional `user:pass` for HTTP Basic auth. Empty disables it.
    pub http_auth: String,
    /// Verify TLS certificates when the scheme is HTTPS.
    pub strict_ssl: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            host: "localhost".into(),
            port: 80,
            base_path: "/nodejs/".into(),
            message_path: "message".into(),
            http_auth: String::new(),
            strict_ssl: true,
        }
    }
}

impl BackendConfig {
    /// Full URL of the backend message endpoint.
    pub fn message_url(&self) -> String {
        format!(
            "{}://{}:{}{}{}",
            self.scheme, self.host, self.port, self.base_path, self.message_path
        )
    }

    /// Parsed Basic-auth credentials, if configured.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        if self.http_auth.is_empty() {
            return None;
        }
        let (user, pass) = self.http_auth.split_once(':')?;
        Some((user.to_owned(), pass.to_owned()))
    }
}

/// Configuration loading errors. These are fatal at startup only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config at {path}: {reason}")]
    Read { path: String, reason: String },
    /// The config file is not valid JSON for [`GatewayConfig`].
    #[error("failed to parse config at {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Load configuration from an optional JSON file, then apply env overrides.
///
/// A `None` path or a nonexistent file yields defaults; a file that exists
/// but cannot be read or parsed is an error.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) if path.exists() => {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        }
        _ => GatewayConfig::default(),
    };
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Apply env-style overrides through a lookup function.
///
/// Invalid values are ignored, falling back to the file/default value.
fn apply_overrides(
    config: &mut GatewayConfig,
    get: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = get("PULSE_HOST") {
        config.host = v;
    }
    if let Some(v) = get("PULSE_PORT").and_then(|v| v.parse().ok()) {
        config.port = v;
    }
    if let Some(v) = get("PULSE_SERVICE_KEY") {
        config.service_key = v;
    }
    if let Some(v) = get("PULSE_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = get("PULSE_BACKEND_HOST") {
        config.backend.host = v;
    }
    if let Some(v) = get("PULSE_BACKEND_PORT").and_then(|v| v.parse().ok()) {
        config.backend.port = v;
    }
}
