//! Transport-facing client capability.

use serde_json::Value;

/// A live client socket as seen by the core.
///
/// The transport adapter owns the byte stream; the core only holds
/// `Arc<dyn ClientHandle>` directory entries and uses this surface to push
/// JSON payloads and to force a close. Sends are best-effort: `false` means
/// the payload was not enqueued (slow or vanished client), never an error to
/// propagate.
pub trait ClientHandle: Send + Sync {
    /// Transport-issued unique socket id.
    fn id(&self) -> &str;

    /// Serialize and enqueue a JSON payload.
    ///
    /// Returns `false` if the client cannot accept it.
    fn send_json(&self, value: &Value) -> bool;

    /// Ask the transport to close this socket.
    fn disconnect(&self);
}

impl std::fmt::Debug for dyn ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id()).finish()
    }
}
