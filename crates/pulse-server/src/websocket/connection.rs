//! Per-socket connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use pulse_core::ClientHandle;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connected WebSocket client.
///
/// Outbound delivery is fire-and-forget through a bounded queue: a full or
/// closed queue counts a drop and reports `false`, it never blocks a
/// handler. The cancellation token closes the socket's session loop.
pub struct WsClient {
    id: String,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl WsClient {
    /// Create a new connection around a send queue.
    pub fn new(id: String, tx: mpsc::Sender<Message>, cancel: CancellationToken) -> Self {
        Self {
            id,
            tx,
            cancel,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a text frame. `false` if the queue is full or closed.
    pub fn send_text(&self, text: String) -> bool {
        if self.tx.try_send(Message::Text(text.into())).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Enqueue a protocol ping.
    pub fn send_ping(&self) -> bool {
        self.tx.try_send(Message::Ping(Default::default())).is_ok()
    }

    /// Total payloads dropped on this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection alive (pong or any activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the connection showed life since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Token cancelled when this socket should close.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl ClientHandle for WsClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_json(&self, value: &Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send_text(json),
            Err(_) => false,
        }
    }

    fn disconnect(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> (WsClient, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(32);
        let client = WsClient::new("conn_1".into(), tx, CancellationToken::new());
        (client, rx)
    }

    #[test]
    fn create_connection() {
        let (client, _rx) = make_client();
        assert_eq!(client.id(), "conn_1");
        assert_eq!(client.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_text_delivers() {
        let (client, mut rx) = make_client();
        assert!(client.send_text("hello".into()));
        match rx.recv().await.unwrap() {
            Message::Text(t) => assert_eq!(t.as_str(), "hello"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (client, mut rx) = make_client();
        assert!(client.send_json(&serde_json::json!({"key": "value"})));
        match rx.recv().await.unwrap() {
            Message::Text(t) => {
                let parsed: Value = serde_json::from_str(t.as_str()).unwrap();
                assert_eq!(parsed["key"], "value");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_queue_counts_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let client = WsClient::new("conn_2".into(), tx, CancellationToken::new());
        assert!(client.send_text("first".into()));
        assert!(!client.send_text("second".into()));
        assert_eq!(client.drop_count(), 1);
    }

    #[tokio::test]
    async fn closed_queue_returns_false() {
        let (tx, rx) = mpsc::channel(4);
        let client = WsClient::new("conn_3".into(), tx, CancellationToken::new());
        drop(rx);
        assert!(!client.send_text("hello".into()));
        assert!(!client.send_json(&serde_json::json!({})));
    }

    #[test]
    fn alive_flag_resets_on_check() {
        let (client, _rx) = make_client();
        assert!(client.check_alive());
        assert!(!client.check_alive());
        client.mark_alive();
        assert!(client.check_alive());
    }

    #[test]
    fn disconnect_cancels_token() {
        let (client, _rx) = make_client();
        assert!(!client.cancellation().is_cancelled());
        client.disconnect();
        assert!(client.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn ping_enqueues_ping_frame() {
        let (client, mut rx) = make_client();
        assert!(client.send_ping());
        assert!(matches!(rx.recv().await.unwrap(), Message::Ping(_)));
    }

    #[test]
    fn age_increases() {
        let (client, _rx) = make_client();
        let first = client.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(client.age() > first);
    }
}
