//! End-to-end tests driving a bound gateway with a real WebSocket client
//! and a stubbed CMS backend.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use pulse_core::{EventBus, StateStore};
use pulse_server::backend::BackendClient;
use pulse_server::config::{BackendConfig, GatewayConfig};
use pulse_server::logging::LogControl;
use pulse_server::server::GatewayServer;
use pulse_server::session::SessionManager;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const KEY: &str = "__LOL_TESTING__";

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Reply function for the stubbed backend: parsed `messageJson` in, JSON
/// body out.
type BackendBehavior = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Bind a stub backend that answers `POST /nodejs/message`.
async fn spawn_stub_backend(behavior: BackendBehavior) -> SocketAddr {
    use axum::routing::post;
    use axum::Form;

    let app = axum::Router::new().route(
        "/nodejs/message",
        post(move |Form(fields): Form<HashMap<String, String>>| {
            let behavior = behavior.clone();
            async move {
                let message: Value = fields
                    .get("messageJson")
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(Value::Null);
                axum::Json(behavior(message))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Boot a gateway wired to the stub backend. Returns the bound address.
async fn boot_gateway(behavior: BackendBehavior) -> (SocketAddr, GatewayServer) {
    let backend_addr = spawn_stub_backend(behavior).await;
    let config = GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        service_key: KEY.into(),
        offline_grace_ms: 100,
        backend: BackendConfig {
            host: "127.0.0.1".into(),
            port: backend_addr.port(),
            ..BackendConfig::default()
        },
        ..GatewayConfig::default()
    };

    let backend = Arc::new(BackendClient::new(&config.backend, &config.service_key).unwrap());
    let store = Arc::new(StateStore::new());
    let bus = Arc::new(EventBus::new());
    let manager = SessionManager::new(store, backend.clone(), bus, &config);
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let server = GatewayServer::new(
        config,
        manager,
        backend,
        Arc::new(LogControl::disabled()),
        metrics_handle,
    );
    let (addr, _task) = server.listen().await.unwrap();
    (addr, server)
}

/// Stub behavior that accepts every token, echoing the correlated ids.
fn accepting_backend() -> BackendBehavior {
    Arc::new(|message: Value| {
        json!({
            "nodejsValidAuthToken": true,
            "clientId": message["clientId"],
            "authToken": message["authToken"],
            "channels": [],
            "uid": 666,
        })
    })
}

async fn connect_ws(addr: SocketAddr) -> WsStream {
    let (stream, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    stream
}

/// Next JSON text frame, skipping protocol frames. `None` on close.
async fn next_json(ws: &mut WsStream) -> Option<Value> {
    loop {
        let frame = timeout(TIMEOUT, ws.next()).await.ok()??;
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

fn admin_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}/nodejs/{path}")
}

// ── Admin surface ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_service_key_is_rejected() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;

    let body: Value = reqwest::get(format!("http://{addr}/nodejs/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"error": "Invalid service key."}));
}

#[tokio::test]
async fn valid_key_unknown_path_is_404() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;

    let response = reqwest::Client::new()
        .get(admin_url(addr, "fakepath"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "Not Found.");
}

#[tokio::test]
async fn content_token_round_trip_shows_in_health() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(admin_url(addr, "content/token"))
        .header("NodejsServiceKey", KEY)
        .json(&json!({"channel": "test_channel", "token": "mytoken"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");

    let health: Value = client
        .get(admin_url(addr, "health/check"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(health["contentTokens"]
        .as_object()
        .unwrap()
        .contains_key("test_channel"));
}

#[tokio::test]
async fn channel_create_and_check() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(admin_url(addr, "channel/add/test_channel_2"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");

    let body: Value = client
        .get(admin_url(addr, "channel/check/test_channel_2"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"], true);
}

// ── Socket authentication ───────────────────────────────────────────

#[tokio::test]
async fn valid_socket_auth() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(
        json!({
            "event": "authenticate",
            "authToken": "lol_test_auth_token",
            "ackId": "a1",
        })
        .to_string(),
    ))
    .await
    .unwrap();

    // The clientAuthenticated callback precedes the ack.
    let callback = next_json(&mut ws).await.unwrap();
    assert_eq!(callback["callback"], "clientAuthenticated");
    assert_eq!(callback["data"]["uid"], 666);
    assert_eq!(callback["data"]["authToken"], "lol_test_auth_token");

    let ack = next_json(&mut ws).await.unwrap();
    assert_eq!(ack["ackId"], "a1");
    assert_eq!(ack["data"]["result"], "success");

    let health: Value = reqwest::Client::new()
        .get(admin_url(addr, "health/check"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sockets"], 1);
    assert_eq!(health["onlineUsers"], 1);
}

#[tokio::test]
async fn invalid_socket_auth_disconnects() {
    let behavior: BackendBehavior =
        Arc::new(|_| json!({"nodejsValidAuthToken": false}));
    let (addr, _server) = boot_gateway(behavior).await;
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(
        json!({
            "event": "authenticate",
            "authToken": "lol_test_auth_token",
            "ackId": "a1",
        })
        .to_string(),
    ))
    .await
    .unwrap();

    // No ack, no callback: the server closes the socket.
    assert!(next_json(&mut ws).await.is_none());

    let health: Value = reqwest::Client::new()
        .get(admin_url(addr, "health/check"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sockets"], 0);
    assert_eq!(health["preAuthSockets"], 0);
}

#[tokio::test]
async fn backend_error_body_disconnects() {
    let behavior: BackendBehavior =
        Arc::new(|_| json!({"error": "backend exploded"}));
    let (addr, _server) = boot_gateway(behavior).await;
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(
        json!({"event": "authenticate", "authToken": "t"}).to_string(),
    ))
    .await
    .unwrap();
    assert!(next_json(&mut ws).await.is_none());
}

// ── Control-plane → socket delivery ─────────────────────────────────

#[tokio::test]
async fn publish_reaches_channel_member() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let client = reqwest::Client::new();

    let mut ws = connect_ws(addr).await;
    ws.send(Message::Text(
        json!({
            "event": "authenticate",
            "authToken": "lol_test_auth_token",
        })
        .to_string(),
    ))
    .await
    .unwrap();
    let callback = next_json(&mut ws).await.unwrap();
    assert_eq!(callback["callback"], "clientAuthenticated");

    // Join uid 666 to a channel through the control plane.
    let body: Value = client
        .post(admin_url(addr, "user/channel/add/test_channel/666"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");

    let body: Value = client
        .post(admin_url(addr, "publish"))
        .header("NodejsServiceKey", KEY)
        .json(&json!({"channel": "test_channel", "body": "breaking news"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["sent"], 1);

    let delivered = next_json(&mut ws).await.unwrap();
    assert_eq!(delivered["channel"], "test_channel");
    assert_eq!(delivered["body"], "breaking news");
}

#[tokio::test]
async fn broadcast_reaches_all_sockets() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let client = reqwest::Client::new();

    let mut first = connect_ws(addr).await;
    let mut second = connect_ws(addr).await;
    for (i, ws) in [&mut first, &mut second].into_iter().enumerate() {
        ws.send(Message::Text(
            json!({"event": "authenticate", "authToken": format!("tok_{i}")}).to_string(),
        ))
        .await
        .unwrap();
        let callback = next_json(ws).await.unwrap();
        assert_eq!(callback["callback"], "clientAuthenticated");
    }

    let body: Value = client
        .post(admin_url(addr, "publish"))
        .header("NodejsServiceKey", KEY)
        .json(&json!({"broadcast": true, "body": "to everyone"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["sent"], 2);

    for ws in [&mut first, &mut second] {
        let delivered = next_json(ws).await.unwrap();
        assert_eq!(delivered["body"], "to everyone");
    }
}

#[tokio::test]
async fn kick_closes_live_socket() {
    let (addr, _server) = boot_gateway(accepting_backend()).await;
    let client = reqwest::Client::new();

    let mut ws = connect_ws(addr).await;
    ws.send(Message::Text(
        json!({"event": "authenticate", "authToken": "lol_test_auth_token"}).to_string(),
    ))
    .await
    .unwrap();
    let callback = next_json(&mut ws).await.unwrap();
    assert_eq!(callback["callback"], "clientAuthenticated");

    let body: Value = client
        .post(admin_url(addr, "user/kick/666"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");

    assert!(next_json(&mut ws).await.is_none(), "socket should be closed");

    let health: Value = client
        .get(admin_url(addr, "health/check"))
        .header("NodejsServiceKey", KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sockets"], 0);
}
