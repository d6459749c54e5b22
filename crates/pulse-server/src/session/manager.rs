//! The session manager: socket lifecycle, authentication, routing, fan-out.
//!
//! One manager instance serves every socket. It is cheap to clone (all
//! fields are shared) and every method is safe to call from any task; the
//! store lock is never held across an await point, so other sockets keep
//! being serviced while a backend authentication round-trip is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pulse_core::{AuthIdentity, ClientHandle, EventBus, GatewayEvent, StateStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::BackendClient;
use crate::config::GatewayConfig;
use crate::metrics as metric_names;

use super::timers::GraceTimers;

/// Ack callback handed in by the transport for `authenticate` frames.
pub type AuthAck = Box<dyn FnOnce(Value) + Send>;

/// Client `authenticate` payload.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRequest {
    /// Token to validate against the backend.
    pub auth_token: String,
    /// Token-channel name → content token to redeem on success.
    pub content_tokens: Option<HashMap<String, String>>,
    /// Any further fields the client sent; forwarded to the backend.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Client `join-token-channel` payload.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinTokenRequest {
    pub channel: Option<String>,
    pub content_token: Option<String>,
}

/// Stateful engine tracking sockets, identities, channels, and presence.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<StateStore>,
    backend: Arc<BackendClient>,
    bus: Arc<EventBus>,
    timers: Arc<GraceTimers>,
    clients_can_write_to_clients: bool,
    offline_grace: Duration,
}

impl SessionManager {
    /// Create a manager over shared state.
    pub fn new(
        store: Arc<StateStore>,
        backend: Arc<BackendClient>,
        bus: Arc<EventBus>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            backend,
            bus,
            timers: Arc::new(GraceTimers::new()),
            clients_can_write_to_clients: config.clients_can_write_to_clients,
            offline_grace: Duration::from_millis(config.offline_grace_ms),
        }
    }

    /// Shared state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Lifecycle event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Grace-timer registries (exposed for tests and health probes).
    pub fn timers(&self) -> &Arc<GraceTimers> {
        &self.timers
    }

    // ── Socket registration ─────────────────────────────────────────

    /// Track a freshly connected socket and announce it.
    pub fn register_socket(&self, handle: Arc<dyn ClientHandle>) {
        let session_id = handle.id().to_owned();
        self.store.add_pre_auth(handle);
        counter!(metric_names::WS_CONNECTIONS_TOTAL).increment(1);
        debug!(session_id, "client connected");
        self.bus
            .emit(&GatewayEvent::ClientConnection { session_id });
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Authenticate a socket.
    ///
    /// A cached identity short-circuits the backend round-trip; otherwise the
    /// request is forwarded with `messageType=authenticate` and the
    /// correlated socket id. Any rejection (transport error, 404/301,
    /// non-JSON body, `error` key, token not accepted) disconnects the
    /// socket without invoking `ack`.
    pub async fn authenticate(
        &self,
        session_id: &str,
        request: AuthRequest,
        ack: Option<AuthAck>,
    ) {
        if let Some(identity) = self.store.identity(&request.auth_token) {
            debug!(session_id, "reusing cached identity");
            self.setup_connection(session_id, &identity, request.content_tokens.as_ref());
            if let Some(ack) = ack {
                ack(json!({"result": "success"}));
            }
            return;
        }

        let mut envelope = Value::Object(request.extra.clone());
        envelope["authToken"] = json!(request.auth_token);
        if let Some(tokens) = &request.content_tokens {
            envelope["contentTokens"] = json!(tokens);
        }
        envelope["messageType"] = json!("authenticate");
        envelope["clientId"] = json!(session_id);

        // Suspension point: the socket stays in pre-auth and may disconnect
        // while this request is outstanding.
        let reply = match self.backend.send_message(&envelope).await {
            Ok(reply) => reply,
            Err(err) => {
                return self.reject_auth(session_id, &format!("backend unreachable: {err}"));
            }
        };
        if reply.status == 404 || reply.status == 301 {
            return self.reject_auth(session_id, &format!("backend replied {}", reply.status));
        }
        let body: Value = match serde_json::from_str(&reply.body) {
            Ok(body) => body,
            Err(_) => return self.reject_auth(session_id, "backend reply was not JSON"),
        };
        if body.get("error").is_some() {
            return self.reject_auth(session_id, "backend reported an error");
        }
        if body.get("nodejsValidAuthToken") != Some(&json!(true)) {
            return self.reject_auth(session_id, "auth token not accepted");
        }
        let identity: AuthIdentity = match serde_json::from_value(body) {
            Ok(identity) => identity,
            Err(err) => {
                return self.reject_auth(session_id, &format!("malformed identity: {err}"));
            }
        };

        let connect_id = identity
            .client_id
            .clone()
            .unwrap_or_else(|| session_id.to_owned());
        let content_tokens = identity.content_tokens.clone();
        self.setup_connection(&connect_id, &identity, content_tokens.as_ref());
        self.store.insert_identity(identity);
        if let Some(ack) = ack {
            ack(json!({"result": "success"}));
        }
    }

    fn reject_auth(&self, session_id: &str, reason: &str) {
        warn!(session_id, reason, "authentication rejected");
        counter!(metric_names::AUTH_REJECTED_TOTAL).increment(1);
        if let Some(handle) = self.store.take_pre_auth(session_id) {
            handle.disconnect();
        }
    }

    /// Bind an authenticated identity to a connected socket.
    pub fn setup_connection(
        &self,
        session_id: &str,
        identity: &AuthIdentity,
        content_tokens: Option<&HashMap<String, String>>,
    ) {
        // The socket may have vanished while authentication was in flight.
        if !self
            .store
            .promote(session_id, &identity.auth_token, identity.uid)
        {
            debug!(session_id, "socket gone before authentication completed");
            return;
        }

        for channel in &identity.channels {
            let _ = self.store.add_channel_member(channel, session_id);
        }

        if identity.uid > 0 {
            let _ = self.timers.presence.cancel(&identity.uid);
            let observers = identity.presence_uids.clone().unwrap_or_default();
            if self.store.mark_online(identity.uid, observers) {
                self.notify_backend(json!({
                    "uid": identity.uid,
                    "messageType": "userOnline",
                }));
                self.send_presence_change(identity.uid, "online");
            }
        }

        if let Some(tokens) = content_tokens {
            for (channel, token) in tokens {
                if self
                    .store
                    .redeem_content_token(channel, token, session_id)
                    .is_some()
                {
                    let _ = self
                        .timers
                        .token_channel
                        .cancel(&(channel.clone(), identity.uid));
                }
            }
        }

        self.bus.emit(&GatewayEvent::ClientAuthenticated {
            session_id: session_id.to_owned(),
            identity: identity.clone(),
        });

        if let Some(handle) = self.store.authenticated_handle(session_id) {
            let _ = handle.send_json(&json!({
                "callback": "clientAuthenticated",
                "data": identity,
            }));
        }
    }

    // ── Presence ────────────────────────────────────────────────────

    /// Notify the configured observers that `uid` changed presence state.
    pub fn send_presence_change(&self, uid: u64, event: &str) {
        let Some(observers) = self.store.presence_list(uid) else {
            return;
        };
        self.deliver_presence(uid, event, &observers);
    }

    fn deliver_presence(&self, uid: u64, event: &str, observers: &[u64]) {
        let payload = json!({
            "presenceNotification": {"uid": uid, "event": event},
        });
        for observer in observers {
            for handle in self.store.handles_for_uid(*observer) {
                let _ = handle.send_json(&payload);
            }
        }
    }

    // ── Token channels ──────────────────────────────────────────────

    /// Redeem a content token for an authenticated socket and announce the
    /// join to the token channel.
    pub fn join_token_channel(&self, session_id: &str, request: &JoinTokenRequest) {
        let (Some(channel), Some(token)) = (&request.channel, &request.content_token) else {
            return;
        };
        let Some((_, uid)) = self.store.socket_identity(session_id) else {
            return;
        };
        self.store.ensure_token_channel(channel);
        if let Some(payload) = self.store.redeem_content_token(channel, token, session_id) {
            let _ = self
                .timers
                .token_channel
                .cancel(&(channel.clone(), uid));
            let notice = json!({
                "callback": "clientJoinedTokenChannel",
                "data": payload,
            });
            for handle in self.store.token_channel_handles(channel) {
                let _ = handle.send_json(&notice);
            }
        }
    }

    // ── Inbound client messages ─────────────────────────────────────

    /// Route a client-originated message to the event bus, enforcing write
    /// authorization. Unauthorized attempts are logged and dropped.
    pub fn process_message(&self, session_id: &str, message: Value) {
        if !self.store.is_authenticated(session_id) {
            debug!(session_id, "message from unauthenticated socket dropped");
            return;
        }
        if message.get("type").and_then(Value::as_str).is_none() {
            debug!(session_id, "message without type dropped");
            return;
        }

        match message.get("channel").and_then(Value::as_str) {
            Some(channel) => {
                let allowed = self.store.channel_is_writable(channel)
                    && self.store.channel_has_member(channel, session_id);
                if allowed {
                    self.bus.emit(&GatewayEvent::ClientToChannelMessage {
                        session_id: session_id.to_owned(),
                        message,
                    });
                } else {
                    warn!(session_id, channel, "unauthorized channel write dropped");
                }
            }
            None => {
                if self.clients_can_write_to_clients {
                    self.bus.emit(&GatewayEvent::ClientToClientMessage {
                        session_id: session_id.to_owned(),
                        message,
                    });
                } else {
                    warn!(session_id, "client-to-client messages disabled, dropped");
                }
            }
        }
    }

    // ── Disconnect ──────────────────────────────────────────────────

    /// Run disconnect cleanup for a socket. Idempotent: a second call for
    /// the same id is a no-op.
    pub fn disconnect(&self, session_id: &str) {
        let was_pre_auth = self.store.take_pre_auth(session_id).is_some();
        if !was_pre_auth && !self.store.is_authenticated(session_id) {
            return;
        }
        counter!(metric_names::WS_DISCONNECTIONS_TOTAL).increment(1);
        self.bus.emit(&GatewayEvent::ClientDisconnect {
            session_id: session_id.to_owned(),
        });
        if was_pre_auth {
            return;
        }
        let Some((_, uid)) = self.store.socket_identity(session_id) else {
            return;
        };

        self.store.remove_session_from_channels(session_id);

        if uid > 0 {
            self.arm_presence_timer(uid);
        }

        for (channel, payload) in self.store.take_token_channel_memberships(session_id) {
            let notify = payload
                .get("notifyOnDisconnect")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if notify {
                self.arm_token_channel_timer(channel, uid);
            }
        }

        let _ = self.store.remove_authenticated(session_id);
        debug!(session_id, "client disconnected");
    }

    /// Browser refreshes disconnect and reconnect within hundreds of
    /// milliseconds; the offline notification waits out that window.
    fn arm_presence_timer(&self, uid: u64) {
        let manager = self.clone();
        let grace = self.offline_grace;
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.timers.presence.discard(&uid);
            if manager.store.session_count_for_uid(uid) > 0 {
                return;
            }
            let Some(observers) = manager.store.mark_offline(uid) else {
                return;
            };
            manager.notify_backend(json!({"uid": uid, "messageType": "userOffline"}));
            manager.deliver_presence(uid, "offline", &observers);
        });
        self.timers.presence.arm(uid, task);
    }

    fn arm_token_channel_timer(&self, channel: String, uid: u64) {
        let manager = self.clone();
        let grace = self.offline_grace;
        let key = (channel.clone(), uid);
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.timers.token_channel.discard(&(channel.clone(), uid));
            if manager.store.token_channel_has_uid(&channel, uid) {
                return;
            }
            let notice = json!({
                "channel": channel,
                "contentChannelNotification": true,
                "data": {"uid": uid, "type": "disconnect"},
            });
            let _ = manager.publish_to_token_channel(&channel, &notice);
        });
        self.timers.token_channel.arm(key, task);
    }

    // ── Admin operations ────────────────────────────────────────────

    /// Purge every identity carrying `uid`, close its sockets, and strip
    /// them from channels.
    pub fn kick_user(&self, uid: u64) {
        for token in self.store.identity_tokens_for_uid(uid) {
            let _ = self.store.remove_identity(&token);
        }
        for session_id in self.store.sessions_for_uid(uid) {
            self.close_session(&session_id);
        }
    }

    /// Delete one identity and close its sockets.
    pub fn logout_user(&self, auth_token: &str) {
        let _ = self.store.remove_identity(auth_token);
        for session_id in self.store.sessions_for_token(auth_token) {
            self.close_session(&session_id);
        }
    }

    /// Close the transport first, then run cleanup; the transport's own
    /// disconnect callback becomes a no-op.
    fn close_session(&self, session_id: &str) {
        if let Some(handle) = self.store.authenticated_handle(session_id) {
            handle.disconnect();
        }
        self.disconnect(session_id);
    }

    /// Join every session of `uid` to `channel` (created if needed) and
    /// remember the channel on the uid's identities. `true` iff the uid had
    /// at least one active session.
    pub fn add_user_to_channel(&self, channel: &str, uid: u64) -> bool {
        self.store.ensure_channel(channel);
        let sessions = self.store.sessions_for_uid(uid);
        for session_id in &sessions {
            let _ = self.store.add_channel_member(channel, session_id);
        }
        for token in self.store.identity_tokens_for_uid(uid) {
            let _ = self.store.append_identity_channel(&token, channel);
        }
        !sessions.is_empty()
    }

    /// Reverse of [`Self::add_user_to_channel`]. `true` iff the channel
    /// existed.
    pub fn remove_user_from_channel(&self, channel: &str, uid: u64) -> bool {
        if !self.store.channel_exists(channel) {
            return false;
        }
        for session_id in self.store.sessions_for_uid(uid) {
            let _ = self.store.remove_channel_member(channel, &session_id);
        }
        for token in self.store.identity_tokens_for_uid(uid) {
            let _ = self.store.remove_identity_channel(&token, channel);
        }
        true
    }

    /// Like [`Self::add_user_to_channel`] but keyed by auth token. `true`
    /// iff the token is known (identities survive disconnects).
    pub fn add_auth_token_to_channel(&self, channel: &str, auth_token: &str) -> bool {
        if !self.store.has_identity(auth_token) {
            return false;
        }
        self.store.ensure_channel(channel);
        for session_id in self.store.sessions_for_token(auth_token) {
            let _ = self.store.add_channel_member(channel, &session_id);
        }
        let _ = self.store.append_identity_channel(auth_token, channel);
        true
    }

    /// Reverse of [`Self::add_auth_token_to_channel`]. `true` iff the
    /// channel existed.
    pub fn remove_auth_token_from_channel(&self, channel: &str, auth_token: &str) -> bool {
        if !self.store.channel_exists(channel) {
            return false;
        }
        for session_id in self.store.sessions_for_token(auth_token) {
            let _ = self.store.remove_channel_member(channel, &session_id);
        }
        let _ = self.store.remove_identity_channel(auth_token, channel);
        true
    }

    // ── Fan-out primitives ──────────────────────────────────────────

    /// Deliver to one session. `false` when the session is unknown or its
    /// queue refused the payload.
    pub fn publish_to_client(&self, session_id: &str, message: &Value) -> bool {
        match self.store.authenticated_handle(session_id) {
            Some(handle) => handle.send_json(message),
            None => {
                debug!(session_id, "publish to unknown session");
                false
            }
        }
    }

    /// Deliver to every member of `message.channel`. `None` when the
    /// message has no channel field; otherwise the delivered count.
    pub fn publish_to_channel(&self, message: &Value) -> Option<usize> {
        let channel = message.get("channel").and_then(Value::as_str)?;
        let mut sent = 0;
        for handle in self.store.channel_handles(channel) {
            if handle.send_json(message) {
                sent += 1;
            } else {
                counter!(metric_names::FANOUT_DROPS_TOTAL).increment(1);
            }
        }
        Some(sent)
    }

    /// Deliver to every socket joined to a token channel.
    pub fn publish_to_token_channel(&self, name: &str, message: &Value) -> usize {
        let mut sent = 0;
        for handle in self.store.token_channel_handles(name) {
            if handle.send_json(message) {
                sent += 1;
            } else {
                counter!(metric_names::FANOUT_DROPS_TOTAL).increment(1);
            }
        }
        sent
    }

    /// Deliver to every authenticated socket.
    pub fn broadcast(&self, message: &Value) -> usize {
        let mut sent = 0;
        for handle in self.store.authenticated_handles() {
            if handle.send_json(message) {
                sent += 1;
            } else {
                counter!(metric_names::FANOUT_DROPS_TOTAL).increment(1);
            }
        }
        sent
    }

    fn notify_backend(&self, message: Value) {
        let backend = self.backend.clone();
        let _ = tokio::spawn(async move {
            if let Err(err) = backend.send_message(&message).await {
                warn!(error = %err, "backend notification failed");
            }
        });
    }
}
