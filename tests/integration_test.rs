use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chatrelay::config::RelayConfig;
use chatrelay::protocol::{ChatMessage, MessageKind};
use chatrelay::state::AppState;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot the relay on an ephemeral port and return its WebSocket URL
async fn boot_server() -> (String, Arc<AppState>) {
    boot_server_with(RelayConfig::default()).await
}

async fn boot_server_with(config: RelayConfig) -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = chatrelay::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/ws", addr), state)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsStream, json: serde_json::Value) {
    ws.send(Message::Text(json.to_string().into())).await.unwrap();
}

/// Next chat message, skipping control frames
async fn recv(ws: &mut WsStream) -> ChatMessage {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Connect and complete the handshake, consuming the client's own join notice
async fn join(url: &str, name: &str) -> WsStream {
    let mut ws = connect(url).await;
    send_json(&mut ws, serde_json::json!({"type": "join", "user": name})).await;

    let notice = recv(&mut ws).await;
    assert_eq!(notice.kind, MessageKind::Join);
    assert_eq!(notice.user, name);
    ws
}

async fn wait_for_participants(state: &AppState, expected: usize) {
    timeout(TIMEOUT, async {
        while state.hub.participant_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("participant count never settled");
}

/// Assert the server ends the connection without sending any chat message
async fn expect_closed(ws: &mut WsStream) {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("connection left open") {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected message: {}", text),
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn test_chat_session_end_to_end() {
    let (url, state) = boot_server().await;

    let mut bob = join(&url, "bob").await;
    let mut ann = join(&url, "ann").await;

    let notice = recv(&mut bob).await;
    assert_eq!((notice.kind, notice.user.as_str()), (MessageKind::Join, "ann"));
    assert_eq!(notice.text, "ann joined");

    send_json(&mut bob, serde_json::json!({"text": "hi"})).await;
    for ws in [&mut bob, &mut ann] {
        let msg = recv(ws).await;
        assert_eq!(msg.kind, MessageKind::Msg);
        assert_eq!(msg.user, "bob");
        assert_eq!(msg.text, "hi");
        assert!(chrono::DateTime::parse_from_rfc3339(&msg.time).is_ok());
    }

    ann.close(None).await.unwrap();

    let notice = recv(&mut bob).await;
    assert_eq!(notice.kind, MessageKind::Leave);
    assert_eq!(notice.user, "ann");
    assert_eq!(notice.text, "ann left");
    wait_for_participants(&state, 1).await;
}

#[tokio::test]
async fn test_spoofed_user_is_overwritten() {
    let (url, _state) = boot_server().await;
    let mut alice = join(&url, "alice").await;

    send_json(
        &mut alice,
        serde_json::json!({"type": "msg", "user": "spoofed", "text": "hi", "time": "yesterday"}),
    )
    .await;

    let msg = recv(&mut alice).await;
    assert_eq!(msg.user, "alice");
    assert_ne!(msg.time, "yesterday");
}

#[tokio::test]
async fn test_empty_text_is_not_broadcast() {
    let (url, _state) = boot_server().await;
    let mut alice = join(&url, "alice").await;

    send_json(&mut alice, serde_json::json!({"type": "msg", "text": ""})).await;
    send_json(&mut alice, serde_json::json!({"text": "after"})).await;

    // The empty message is skipped and the connection stays open
    let msg = recv(&mut alice).await;
    assert_eq!(msg.text, "after");
}

#[tokio::test]
async fn test_handshake_without_name_is_rejected() {
    let (url, state) = boot_server().await;
    let mut watcher = join(&url, "watcher").await;

    let mut anon = connect(&url).await;
    send_json(&mut anon, serde_json::json!({"type": "join", "user": ""})).await;
    expect_closed(&mut anon).await;

    let mut garbage = connect(&url).await;
    garbage
        .send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();
    expect_closed(&mut garbage).await;

    assert_eq!(state.hub.participant_count().await, 1);

    // Neither rejected client produced a join or leave notice
    send_json(&mut watcher, serde_json::json!({"text": "still here"})).await;
    assert_eq!(recv(&mut watcher).await.text, "still here");
}

#[tokio::test]
async fn test_malformed_payload_after_join_disconnects() {
    let (url, state) = boot_server().await;
    let mut bob = join(&url, "bob").await;
    let mut ann = join(&url, "ann").await;
    recv(&mut bob).await;

    ann.send(Message::Text("{broken".to_string().into())).await.unwrap();

    let notice = recv(&mut bob).await;
    assert_eq!((notice.kind, notice.user.as_str()), (MessageKind::Leave, "ann"));
    expect_closed(&mut ann).await;
    wait_for_participants(&state, 1).await;
}

async fn get_json(state: Arc<AppState>, uri: &str) -> serde_json::Value {
    let response = chatrelay::app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_reports_participants() {
    let (url, state) = boot_server().await;

    let json = get_json(state.clone(), "/api/health").await;
    assert_eq!(json, serde_json::json!({"status": "ok", "participants": 0}));

    let mut bob = join(&url, "bob").await;
    let _ann = join(&url, "ann").await;
    recv(&mut bob).await;

    let json = get_json(state.clone(), "/api/health").await;
    assert_eq!(json, serde_json::json!({"status": "ok", "participants": 2}));

    let json = get_json(state, "/api/participants").await;
    assert_eq!(json, serde_json::json!({"participants": ["ann", "bob"]}));
}

/// Read until the server ends the connection, ignoring anything still queued
async fn drain_until_closed(ws: &mut WsStream) -> Vec<ChatMessage> {
    let mut seen = Vec::new();
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(Message::Text(text))) => {
                    seen.push(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("server never closed the evicted connection");
    seen
}

#[tokio::test]
async fn test_slow_consumer_is_evicted_and_disconnected() {
    let (url, state) = boot_server_with(RelayConfig {
        send_buffer: 4,
        ..RelayConfig::default()
    })
    .await;

    let mut fast = join(&url, "fast").await;
    // Never reads until it has been evicted
    let mut slow = join(&url, "slow").await;
    assert_eq!(recv(&mut fast).await.user, "slow");

    let payload = "x".repeat(256 * 1024);
    let evicted = timeout(Duration::from_secs(30), async {
        for _ in 0..2000 {
            send_json(&mut fast, serde_json::json!({"text": payload})).await;
            loop {
                let msg = recv(&mut fast).await;
                if msg.kind == MessageKind::Leave {
                    return msg;
                }
                if msg.kind == MessageKind::Msg && msg.user == "fast" {
                    break;
                }
            }
        }
        panic!("slow consumer was never evicted");
    })
    .await
    .expect("flood did not finish");

    assert_eq!(evicted.user, "slow");
    assert_eq!(evicted.text, "slow left");
    wait_for_participants(&state, 1).await;

    // The server tears the socket down without the client ever reading
    let seen = drain_until_closed(&mut slow).await;
    assert!(seen
        .iter()
        .all(|m| !(m.kind == MessageKind::Leave && m.user == "slow")));

    // The survivor keeps chatting and hears no second departure
    send_json(&mut fast, serde_json::json!({"text": "still here"})).await;
    let msg = recv(&mut fast).await;
    assert_eq!((msg.kind, msg.text.as_str()), (MessageKind::Msg, "still here"));
    assert_eq!(state.hub.participants().await, vec!["fast".to_string()]);
}

#[tokio::test]
async fn test_dropped_client_is_announced_once() {
    let (url, state) = boot_server().await;
    let mut bob = join(&url, "bob").await;
    let ann = join(&url, "ann").await;
    recv(&mut bob).await;

    // No close handshake, the TCP connection just goes away
    drop(ann);

    let notice = recv(&mut bob).await;
    assert_eq!((notice.kind, notice.user.as_str()), (MessageKind::Leave, "ann"));
    wait_for_participants(&state, 1).await;

    send_json(&mut bob, serde_json::json!({"text": "anyone?"})).await;
    let msg = recv(&mut bob).await;
    assert_eq!((msg.kind, msg.text.as_str()), (MessageKind::Msg, "anyone?"));
}
