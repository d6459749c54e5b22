//! State-store record types.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::client::ClientHandle;

/// A named long-lived broadcast group.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    /// Socket ids currently joined.
    pub session_ids: HashSet<String>,
    /// Whether authenticated clients may write into this channel.
    pub client_writable: bool,
}

/// An ephemeral content-addressed group.
///
/// `tokens` drains as sockets redeem; `sockets` drains as they disconnect.
#[derive(Clone, Debug, Default)]
pub struct TokenChannel {
    /// Unredeemed one-use tokens → metadata payload.
    pub tokens: HashMap<String, Value>,
    /// Redeemed membership: socket id → metadata payload.
    pub sockets: HashMap<String, Value>,
}

/// Directory entry for an authenticated socket.
#[derive(Clone)]
pub struct AuthedSocket {
    /// Shared transport handle.
    pub handle: Arc<dyn ClientHandle>,
    /// Token this socket authenticated with.
    pub auth_token: String,
    /// uid stamped from the identity; 0 is anonymous.
    pub uid: u64,
}

impl std::fmt::Debug for AuthedSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthedSocket")
            .field("id", &self.handle.id())
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

/// Aggregate counts for health reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Sockets connected but not yet authenticated.
    pub pre_auth: usize,
    /// Authenticated sockets.
    pub authenticated: usize,
    /// Long-lived channels.
    pub channels: usize,
    /// Token channels (with queued tokens or joined sockets).
    pub token_channels: usize,
    /// uids with at least one authenticated socket (or inside a grace window).
    pub online_users: usize,
}
