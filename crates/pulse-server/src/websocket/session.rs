//! WebSocket session lifecycle — one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use pulse_core::ClientHandle;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::session::{AuthAck, AuthRequest, JoinTokenRequest, SessionManager};

use super::connection::WsClient;

/// Outbound queue depth per socket.
const SEND_QUEUE_DEPTH: usize = 256;

/// Frames a client may send, tagged by the `event` field.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Authenticate {
        /// Correlates the optional success ack.
        #[serde(default)]
        ack_id: Option<String>,
        #[serde(flatten)]
        request: AuthRequest,
    },
    JoinTokenChannel {
        #[serde(flatten)]
        request: JoinTokenRequest,
    },
    Message {
        #[serde(flatten)]
        body: serde_json::Map<String, Value>,
    },
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the socket with the session manager (pre-auth)
/// 2. Parses incoming frames and dispatches them
/// 3. Forwards queued outbound payloads
/// 4. Pings on each liveness tick; a client silent for the whole timeout
///    window is closed
/// 5. Runs disconnect cleanup when the stream ends
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    manager: SessionManager,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Message>(SEND_QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let client = Arc::new(WsClient::new(client_id.clone(), send_tx, cancel.clone()));

    info!("client connected");
    manager.register_socket(client.clone());

    // Outbound forwarder: send queue → socket.
    let outbound = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            if ws_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut liveness = tokio::time::interval(heartbeat_interval);
    let silent_limit = missed_ping_limit(heartbeat_interval, heartbeat_timeout);
    let mut silent_ticks: u32 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = liveness.tick() => {
                if client.check_alive() {
                    silent_ticks = 0;
                } else {
                    silent_ticks += 1;
                    if silent_ticks >= silent_limit {
                        warn!(
                            timeout_secs = heartbeat_timeout.as_secs(),
                            "no pong within the timeout window, closing socket"
                        );
                        break;
                    }
                }
                let _ = client.send_ping();
            }
            frame = ws_rx.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(text) => {
                        client.mark_alive();
                        dispatch_frame(&manager, &client, text.as_str()).await;
                    }
                    // Some clients ship JSON in binary frames.
                    Message::Binary(data) => {
                        client.mark_alive();
                        match std::str::from_utf8(&data) {
                            Ok(text) => dispatch_frame(&manager, &client, text).await,
                            Err(_) => {
                                debug!(len = data.len(), "non-UTF8 binary frame ignored");
                            }
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => client.mark_alive(),
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                }
            }
        }
    }

    info!("client disconnected");
    cancel.cancel();
    outbound.abort();
    manager.disconnect(&client_id);
}

/// Consecutive silent liveness ticks tolerated before the socket is
/// considered dead.
fn missed_ping_limit(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    #[allow(clippy::cast_possible_truncation)]
    let limit = (timeout.as_millis() / interval_ms).max(1) as u32;
    limit
}

/// Parse a text frame and hand it to the session manager.
async fn dispatch_frame(manager: &SessionManager, client: &Arc<WsClient>, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, "unparseable client frame dropped");
            return;
        }
    };

    let session_id = client.id().to_owned();
    match frame {
        ClientFrame::Authenticate { ack_id, request } => {
            let ack: Option<AuthAck> = ack_id.map(|id| {
                let client = client.clone();
                Box::new(move |result: Value| {
                    let _ = client.send_json(&json!({"ackId": id, "data": result}));
                }) as AuthAck
            });
            manager.authenticate(&session_id, request, ack).await;
        }
        ClientFrame::JoinTokenChannel { request } => {
            manager.join_token_channel(&session_id, &request);
        }
        ClientFrame::Message { body } => {
            manager.process_message(&session_id, Value::Object(body));
        }
    }
}
