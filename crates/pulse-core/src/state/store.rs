//! The state store: every map the gateway owns, behind one lock.
//!
//! Mutators preserve the cross-map invariants:
//!
//! 1. `pre_auth` and `authenticated` are disjoint; ids move between them
//!    only through [`StateStore::promote`].
//! 2. Channel and token-channel membership only ever references
//!    authenticated sockets.
//! 3. A one-use content token lives in at most one token channel and is
//!    deleted on redemption.
//! 4. `online_users` is driven exclusively by `mark_online` / `mark_offline`
//!    so the session engine can keep it aligned with live sockets and grace
//!    windows.
//!
//! Queries return clones/snapshots, never interior references, so callers
//! can iterate freely while other handlers mutate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::client::ClientHandle;
use crate::identity::AuthIdentity;

use super::types::{AuthedSocket, Channel, StoreCounts, TokenChannel};

#[derive(Default)]
struct Inner {
    pre_auth: HashMap<String, Arc<dyn ClientHandle>>,
    authenticated: HashMap<String, AuthedSocket>,
    identities: HashMap<String, AuthIdentity>,
    channels: HashMap<String, Channel>,
    token_channels: HashMap<String, TokenChannel>,
    /// uid → observer uids for presence notifications.
    online_users: HashMap<u64, Vec<u64>>,
}

/// In-memory gateway state. Cheap to share (`Arc<StateStore>`), internally
/// synchronized; no method holds the lock across control flow the caller can
/// observe.
#[derive(Default)]
pub struct StateStore {
    inner: RwLock<Inner>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Sockets ─────────────────────────────────────────────────────

    /// Register a freshly connected socket in the pre-auth directory.
    pub fn add_pre_auth(&self, handle: Arc<dyn ClientHandle>) {
        let id = handle.id().to_owned();
        let mut inner = self.inner.write();
        // A transport id can only collide if the transport reused it; the
        // newest handle wins either way.
        let _ = inner.authenticated.remove(&id);
        let _ = inner.pre_auth.insert(id, handle);
    }

    /// Remove and return a pre-auth socket.
    pub fn take_pre_auth(&self, id: &str) -> Option<Arc<dyn ClientHandle>> {
        self.inner.write().pre_auth.remove(id)
    }

    /// Whether the socket is connected but not yet authenticated.
    pub fn is_pre_auth(&self, id: &str) -> bool {
        self.inner.read().pre_auth.contains_key(id)
    }

    /// Handles of every socket still waiting on authentication.
    pub fn pre_auth_handles(&self) -> Vec<Arc<dyn ClientHandle>> {
        self.inner.read().pre_auth.values().cloned().collect()
    }

    /// Move a socket from pre-auth to authenticated, stamping its token and
    /// uid. Returns `false` if the socket vanished mid-authentication.
    pub fn promote(&self, id: &str, auth_token: &str, uid: u64) -> bool {
        let mut inner = self.inner.write();
        match inner.pre_auth.remove(id) {
            Some(handle) => {
                let _ = inner.authenticated.insert(
                    id.to_owned(),
                    AuthedSocket {
                        handle,
                        auth_token: auth_token.to_owned(),
                        uid,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Drop an authenticated socket from the directory.
    ///
    /// Callers strip channel/token-channel membership first so invariant 2
    /// never lapses between admin operations.
    pub fn remove_authenticated(&self, id: &str) -> Option<AuthedSocket> {
        self.inner.write().authenticated.remove(id)
    }

    /// Whether the socket is authenticated.
    pub fn is_authenticated(&self, id: &str) -> bool {
        self.inner.read().authenticated.contains_key(id)
    }

    /// Transport handle of an authenticated socket.
    pub fn authenticated_handle(&self, id: &str) -> Option<Arc<dyn ClientHandle>> {
        self.inner.read().authenticated.get(id).map(|s| s.handle.clone())
    }

    /// `(auth_token, uid)` stamped on an authenticated socket.
    pub fn socket_identity(&self, id: &str) -> Option<(String, u64)> {
        self.inner
            .read()
            .authenticated
            .get(id)
            .map(|s| (s.auth_token.clone(), s.uid))
    }

    /// Handles of every authenticated socket.
    pub fn authenticated_handles(&self) -> Vec<Arc<dyn ClientHandle>> {
        self.inner
            .read()
            .authenticated
            .values()
            .map(|s| s.handle.clone())
            .collect()
    }

    /// Session ids of authenticated sockets carrying `uid`.
    pub fn sessions_for_uid(&self, uid: u64) -> Vec<String> {
        self.inner
            .read()
            .authenticated
            .iter()
            .filter(|(_, s)| s.uid == uid)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Handles of authenticated sockets carrying `uid`.
    pub fn handles_for_uid(&self, uid: u64) -> Vec<Arc<dyn ClientHandle>> {
        self.inner
            .read()
            .authenticated
            .values()
            .filter(|s| s.uid == uid)
            .map(|s| s.handle.clone())
            .collect()
    }

    /// Session ids of authenticated sockets holding `auth_token`.
    pub fn sessions_for_token(&self, auth_token: &str) -> Vec<String> {
        self.inner
            .read()
            .authenticated
            .iter()
            .filter(|(_, s)| s.auth_token == auth_token)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Handles of authenticated sockets holding `auth_token`.
    pub fn handles_for_token(&self, auth_token: &str) -> Vec<Arc<dyn ClientHandle>> {
        self.inner
            .read()
            .authenticated
            .values()
            .filter(|s| s.auth_token == auth_token)
            .map(|s| s.handle.clone())
            .collect()
    }

    /// How many authenticated sockets carry `uid`.
    pub fn session_count_for_uid(&self, uid: u64) -> usize {
        self.inner
            .read()
            .authenticated
            .values()
            .filter(|s| s.uid == uid)
            .count()
    }

    // ── Identities ──────────────────────────────────────────────────

    /// Cache an identity under its auth token.
    pub fn insert_identity(&self, identity: AuthIdentity) {
        let mut inner = self.inner.write();
        let _ = inner
            .identities
            .insert(identity.auth_token.clone(), identity);
    }

    /// Cached identity for an auth token.
    pub fn identity(&self, auth_token: &str) -> Option<AuthIdentity> {
        self.inner.read().identities.get(auth_token).cloned()
    }

    /// Whether an identity is cached for the token.
    pub fn has_identity(&self, auth_token: &str) -> bool {
        self.inner.read().identities.contains_key(auth_token)
    }

    /// Delete a cached identity (logout / kick).
    pub fn remove_identity(&self, auth_token: &str) -> Option<AuthIdentity> {
        self.inner.write().identities.remove(auth_token)
    }

    /// Auth tokens of every cached identity carrying `uid`, snapshotted so
    /// callers can delete while iterating.
    pub fn identity_tokens_for_uid(&self, uid: u64) -> Vec<String> {
        self.inner
            .read()
            .identities
            .iter()
            .filter(|(_, identity)| identity.uid == uid)
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Append `channel` to the identity's channel list if absent.
    /// Returns `false` when the identity is unknown.
    pub fn append_identity_channel(&self, auth_token: &str, channel: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.identities.get_mut(auth_token) {
            Some(identity) => {
                if !identity.channels.iter().any(|c| c == channel) {
                    identity.channels.push(channel.to_owned());
                }
                true
            }
            None => false,
        }
    }

    /// Remove `channel` from the identity's channel list.
    pub fn remove_identity_channel(&self, auth_token: &str, channel: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.identities.get_mut(auth_token) {
            Some(identity) => {
                identity.channels.retain(|c| c != channel);
                true
            }
            None => false,
        }
    }

    // ── Channels ────────────────────────────────────────────────────

    /// Create a channel. `false` if it already exists.
    pub fn add_channel(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.channels.contains_key(name) {
            return false;
        }
        let _ = inner.channels.insert(name.to_owned(), Channel::default());
        true
    }

    /// Create the channel if absent.
    pub fn ensure_channel(&self, name: &str) {
        let mut inner = self.inner.write();
        let _ = inner.channels.entry(name.to_owned()).or_default();
    }

    /// Delete a channel. `false` if it did not exist.
    pub fn remove_channel(&self, name: &str) -> bool {
        self.inner.write().channels.remove(name).is_some()
    }

    /// Whether a channel exists.
    pub fn channel_exists(&self, name: &str) -> bool {
        self.inner.read().channels.contains_key(name)
    }

    /// Join an authenticated socket to a channel (created if absent).
    ///
    /// Refuses unauthenticated ids, which is what keeps channel membership
    /// pointing only at live authenticated sockets.
    pub fn add_channel_member(&self, channel: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write();
        if !inner.authenticated.contains_key(session_id) {
            return false;
        }
        let entry = inner.channels.entry(channel.to_owned()).or_default();
        let _ = entry.session_ids.insert(session_id.to_owned());
        true
    }

    /// Remove a socket from a channel. `false` if either is unknown.
    pub fn remove_channel_member(&self, channel: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.channels.get_mut(channel) {
            Some(entry) => entry.session_ids.remove(session_id),
            None => false,
        }
    }

    /// Strip a socket from every channel member set.
    pub fn remove_session_from_channels(&self, session_id: &str) {
        let mut inner = self.inner.write();
        for channel in inner.channels.values_mut() {
            let _ = channel.session_ids.remove(session_id);
        }
    }

    /// Whether the socket is a member of the channel.
    pub fn channel_has_member(&self, channel: &str, session_id: &str) -> bool {
        self.inner
            .read()
            .channels
            .get(channel)
            .is_some_and(|c| c.session_ids.contains(session_id))
    }

    /// Snapshot of a channel's member session ids.
    pub fn channel_sessions(&self, channel: &str) -> Vec<String> {
        self.inner
            .read()
            .channels
            .get(channel)
            .map(|c| c.session_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Handles of a channel's members.
    pub fn channel_handles(&self, channel: &str) -> Vec<Arc<dyn ClientHandle>> {
        let inner = self.inner.read();
        let Some(entry) = inner.channels.get(channel) else {
            return Vec::new();
        };
        entry
            .session_ids
            .iter()
            .filter_map(|id| inner.authenticated.get(id))
            .map(|s| s.handle.clone())
            .collect()
    }

    /// Flip the client-writable flag. `false` if the channel is unknown.
    pub fn set_channel_writable(&self, channel: &str, writable: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.channels.get_mut(channel) {
            Some(entry) => {
                entry.client_writable = writable;
                true
            }
            None => false,
        }
    }

    /// Whether clients may write into the channel.
    pub fn channel_is_writable(&self, channel: &str) -> bool {
        self.inner
            .read()
            .channels
            .get(channel)
            .is_some_and(|c| c.client_writable)
    }

    // ── Token channels ──────────────────────────────────────────────

    /// Create the token channel if absent.
    pub fn ensure_token_channel(&self, name: &str) {
        let mut inner = self.inner.write();
        let _ = inner.token_channels.entry(name.to_owned()).or_default();
    }

    /// Whether the token channel exists.
    pub fn token_channel_exists(&self, name: &str) -> bool {
        self.inner.read().token_channels.contains_key(name)
    }

    /// Queue a one-use token with its payload, creating the channel if
    /// needed. The same token is evicted from any other channel so it can be
    /// redeemed at most once.
    pub fn set_content_token(&self, channel: &str, token: &str, payload: Value) {
        let mut inner = self.inner.write();
        for (name, tc) in inner.token_channels.iter_mut() {
            if name != channel {
                let _ = tc.tokens.remove(token);
            }
        }
        let entry = inner.token_channels.entry(channel.to_owned()).or_default();
        let _ = entry.tokens.insert(token.to_owned(), payload);
    }

    /// Redeem `token` for an authenticated socket: the payload moves from the
    /// token queue to the socket membership map and the token is deleted.
    /// Returns the payload on success.
    pub fn redeem_content_token(
        &self,
        channel: &str,
        token: &str,
        session_id: &str,
    ) -> Option<Value> {
        let mut inner = self.inner.write();
        if !inner.authenticated.contains_key(session_id) {
            return None;
        }
        let entry = inner.token_channels.get_mut(channel)?;
        let payload = entry.tokens.remove(token)?;
        let _ = entry.sockets.insert(session_id.to_owned(), payload.clone());
        Some(payload)
    }

    /// Snapshot of a token channel's `(session_id, payload)` membership.
    pub fn token_channel_sockets(&self, name: &str) -> Vec<(String, Value)> {
        self.inner
            .read()
            .token_channels
            .get(name)
            .map(|tc| {
                tc.sockets
                    .iter()
                    .map(|(id, payload)| (id.clone(), payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handles of sockets joined to a token channel.
    pub fn token_channel_handles(&self, name: &str) -> Vec<Arc<dyn ClientHandle>> {
        let inner = self.inner.read();
        let Some(tc) = inner.token_channels.get(name) else {
            return Vec::new();
        };
        tc.sockets
            .keys()
            .filter_map(|id| inner.authenticated.get(id))
            .map(|s| s.handle.clone())
            .collect()
    }

    /// Remove a socket from every token channel, returning the
    /// `(channel, payload)` pairs it was a member of.
    pub fn take_token_channel_memberships(&self, session_id: &str) -> Vec<(String, Value)> {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();
        for (name, tc) in inner.token_channels.iter_mut() {
            if let Some(payload) = tc.sockets.remove(session_id) {
                removed.push((name.clone(), payload));
            }
        }
        removed
    }

    /// Whether any socket with `uid` remains joined to the token channel.
    pub fn token_channel_has_uid(&self, name: &str, uid: u64) -> bool {
        let inner = self.inner.read();
        let Some(tc) = inner.token_channels.get(name) else {
            return false;
        };
        tc.sockets
            .keys()
            .filter_map(|id| inner.authenticated.get(id))
            .any(|s| s.uid == uid)
    }

    /// Queued-token snapshot for health reporting:
    /// channel → token → payload.
    pub fn content_tokens_snapshot(&self) -> Value {
        let inner = self.inner.read();
        let mut channels = serde_json::Map::new();
        for (name, tc) in &inner.token_channels {
            let tokens: serde_json::Map<String, Value> = tc
                .tokens
                .iter()
                .map(|(token, payload)| (token.clone(), payload.clone()))
                .collect();
            let _ = channels.insert(name.clone(), Value::Object(tokens));
        }
        Value::Object(channels)
    }

    // ── Presence / online users ─────────────────────────────────────

    /// Mark a uid online with its observer list. `false` if already online.
    pub fn mark_online(&self, uid: u64, observers: Vec<u64>) -> bool {
        let mut inner = self.inner.write();
        if inner.online_users.contains_key(&uid) {
            return false;
        }
        let _ = inner.online_users.insert(uid, observers);
        true
    }

    /// Whether the uid is currently marked online.
    pub fn is_online(&self, uid: u64) -> bool {
        self.inner.read().online_users.contains_key(&uid)
    }

    /// Mark a uid offline, returning its observer list.
    pub fn mark_offline(&self, uid: u64) -> Option<Vec<u64>> {
        self.inner.write().online_users.remove(&uid)
    }

    /// Observer list for an online uid.
    pub fn presence_list(&self, uid: u64) -> Option<Vec<u64>> {
        self.inner.read().online_users.get(&uid).cloned()
    }

    /// Replace the observer list of an online uid. `false` when offline.
    pub fn set_presence_list(&self, uid: u64, observers: Vec<u64>) -> bool {
        let mut inner = self.inner.write();
        match inner.online_users.get_mut(&uid) {
            Some(list) => {
                *list = observers;
                true
            }
            None => false,
        }
    }

    // ── Aggregates ──────────────────────────────────────────────────

    /// Counts for health reporting.
    pub fn counts(&self) -> StoreCounts {
        let inner = self.inner.read();
        StoreCounts {
            pre_auth: inner.pre_auth.len(),
            authenticated: inner.authenticated.len(),
            channels: inner.channels.len(),
            token_channels: inner.token_channels.len(),
            online_users: inner.online_users.len(),
        }
    }
}
