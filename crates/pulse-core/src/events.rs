//! Lifecycle event bus for extension subscribers.
//!
//! The bus is an explicit value handed to extensions at setup rather than
//! process-global state. Delivery is synchronous, in registration order; a
//! panicking subscriber is isolated so later subscribers still run.
//! Subscriptions are made once at startup — subscribing from inside a
//! handler is not supported.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::identity::AuthIdentity;

/// Named lifecycle events observable by extensions.
#[derive(Clone, Debug)]
pub enum GatewayEvent {
    /// A new socket connected (pre-auth).
    ClientConnection { session_id: String },
    /// A socket completed authentication.
    ClientAuthenticated {
        session_id: String,
        identity: AuthIdentity,
    },
    /// An authenticated socket sent a message with no channel set.
    ClientToClientMessage { session_id: String, message: Value },
    /// An authenticated socket sent a message into a writable channel.
    ClientToChannelMessage { session_id: String, message: Value },
    /// A socket disconnected.
    ClientDisconnect { session_id: String },
    /// An admin publish was delivered.
    MessagePublished { message: Value },
}

impl GatewayEvent {
    /// Stable event name used for subscription matching.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientConnection { .. } => "client-connection",
            Self::ClientAuthenticated { .. } => "client-authenticated",
            Self::ClientToClientMessage { .. } => "client-to-client-message",
            Self::ClientToChannelMessage { .. } => "client-to-channel-message",
            Self::ClientDisconnect { .. } => "client-disconnect",
            Self::MessagePublished { .. } => "message-published",
        }
    }
}

type Subscriber = Box<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Pub/sub registry of lifecycle event subscribers.
pub struct EventBus {
    subscribers: RwLock<Vec<(String, Subscriber)>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register `handler` for the named event.
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(&GatewayEvent) + Send + Sync + 'static,
    ) {
        self.subscribers
            .write()
            .push((event.to_owned(), Box::new(handler)));
    }

    /// Deliver `event` to every matching subscriber, in registration order.
    pub fn emit(&self, event: &GatewayEvent) {
        let subscribers = self.subscribers.read();
        for (name, handler) in subscribers.iter() {
            if name != event.name() {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = event.name(), "event subscriber panicked");
            }
        }
    }

    /// Number of registered subscriptions (all events).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
