//! End-to-end tests over real WebSockets against a minimal fake gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        RawQuery, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use gateway_client::gateway::CLOSE_ABNORMAL;
use gateway_client::{ChannelHandler, ConnectionState, GatewayClient, GatewayConfig, GatewayEvent};

const WAIT: Duration = Duration::from_secs(5);

/// What the fake gateway observed.
#[derive(Debug)]
enum Seen {
    Query(Option<String>),
    Heartbeat,
    Text(String),
    Pong(Vec<u8>),
    Close(Option<u16>),
}

#[derive(Clone)]
struct FakeGateway {
    heartbeat_interval: u64,
    /// Close with 4001 after this many heartbeats.
    close_after: Option<usize>,
    /// Ping the client right after hello.
    ping: bool,
    seen: mpsc::UnboundedSender<Seen>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(gateway): State<Arc<FakeGateway>>,
) -> impl IntoResponse {
    let _ = gateway.seen.send(Seen::Query(query));
    ws.on_upgrade(move |socket| serve_client(socket, gateway))
}

async fn serve_client(socket: WebSocket, gateway: Arc<FakeGateway>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let hello = json!({ "op": 10, "d": { "heartbeat_interval": gateway.heartbeat_interval } });
    if ws_tx.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }
    if gateway.ping && ws_tx.send(Message::Ping(b"gw".to_vec())).await.is_err() {
        return;
    }

    let mut beats = 0;
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                let op = serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|v| v["op"].as_u64());
                if op != Some(1) {
                    let _ = gateway.seen.send(Seen::Text(text));
                    continue;
                }
                let _ = gateway.seen.send(Seen::Heartbeat);
                beats += 1;
                if gateway.close_after == Some(beats) {
                    let frame = CloseFrame {
                        code: 4001,
                        reason: "session timeout".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    return;
                }
            }
            Message::Pong(data) => {
                let _ = gateway.seen.send(Seen::Pong(data));
            }
            Message::Close(frame) => {
                let _ = gateway.seen.send(Seen::Close(frame.map(|f| f.code)));
                return;
            }
            _ => {}
        }
    }
}

/// Start a fake gateway and return its base URL.
async fn spawn_gateway(
    heartbeat_interval: u64,
    close_after: Option<usize>,
    ping: bool,
) -> (String, mpsc::UnboundedReceiver<Seen>) {
    let (seen, seen_rx) = mpsc::unbounded_channel();
    let gateway = Arc::new(FakeGateway {
        heartbeat_interval,
        close_after,
        ping,
        seen,
    });
    let app = Router::new().route("/", get(ws_handler)).with_state(gateway);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}", addr), seen_rx)
}

fn config_for(url: String) -> GatewayConfig {
    GatewayConfig {
        url,
        ..GatewayConfig::default()
    }
}

async fn next_seen(seen: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(WAIT, seen.recv())
        .await
        .expect("fake gateway saw nothing")
        .expect("fake gateway stopped")
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> GatewayEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_heartbeats_over_websocket() {
    let (url, mut seen) = spawn_gateway(100, None, false).await;
    let (handler, mut events) = ChannelHandler::new();
    let mut client = GatewayClient::new(config_for(url), Arc::new(handler));

    client.connect("token").await;

    match next_seen(&mut seen).await {
        Seen::Query(query) => assert_eq!(query.as_deref(), Some("v=9&encoding=json")),
        other => panic!("Expected upgrade request, got {:?}", other),
    }
    assert!(matches!(next_event(&mut events).await, GatewayEvent::Open { .. }));
    match next_event(&mut events).await {
        GatewayEvent::Frame { frame, .. } => assert!(frame.is_hello()),
        other => panic!("Expected hello, got {:?}", other),
    }

    // Immediate beat, then two scheduled ones.
    assert!(matches!(next_seen(&mut seen).await, Seen::Heartbeat));
    let first = Instant::now();
    assert!(matches!(next_seen(&mut seen).await, Seen::Heartbeat));
    assert!(matches!(next_seen(&mut seen).await, Seen::Heartbeat));
    assert!(first.elapsed() >= Duration::from_millis(150));

    assert_eq!(client.state(), ConnectionState::Connected);
    let period = client.info().unwrap().heartbeat_period.unwrap();
    assert!(period >= Duration::from_millis(100) && period < Duration::from_millis(110));

    client.disconnect().await;

    match next_event(&mut events).await {
        GatewayEvent::Close { code, reason, .. } => {
            assert_eq!(code, 1000);
            assert_eq!(reason, "client disconnect");
        }
        other => panic!("Expected Close, got {:?}", other),
    }
    // The gateway gets our close frame and nothing after it.
    loop {
        match next_seen(&mut seen).await {
            Seen::Heartbeat => continue,
            Seen::Close(code) => {
                assert_eq!(code, Some(1000));
                break;
            }
            other => panic!("Unexpected {:?}", other),
        }
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_gateway_close_is_reported() {
    let (url, mut seen) = spawn_gateway(50, Some(2), false).await;
    let (handler, mut events) = ChannelHandler::new();
    let mut client = GatewayClient::new(config_for(url), Arc::new(handler));

    client.connect("token").await;

    let close = loop {
        if let GatewayEvent::Close { code, reason, .. } = next_event(&mut events).await {
            break (code, reason);
        }
    };
    assert_eq!(close, (4001, "session timeout".to_string()));
    assert_eq!(client.state(), ConnectionState::Closed);

    // Query, then exactly the two heartbeats before the gateway hung up.
    assert!(matches!(next_seen(&mut seen).await, Seen::Query(_)));
    assert!(matches!(next_seen(&mut seen).await, Seen::Heartbeat));
    assert!(matches!(next_seen(&mut seen).await, Seen::Heartbeat));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_unreachable_gateway() {
    // Grab a free port and release it so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (handler, mut events) = ChannelHandler::new();
    let mut client = GatewayClient::new(config_for(format!("ws://{}", addr)), Arc::new(handler));

    client.connect("token").await;

    assert!(matches!(next_event(&mut events).await, GatewayEvent::Error { .. }));
    match next_event(&mut events).await {
        GatewayEvent::Close { code, .. } => assert_eq!(code, CLOSE_ABNORMAL),
        other => panic!("Expected Close, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_ping_answered_once_and_not_forwarded() {
    let (url, mut seen) = spawn_gateway(100, None, true).await;
    let (handler, mut events) = ChannelHandler::new();
    let mut client = GatewayClient::new(config_for(url), Arc::new(handler));

    client.connect("token").await;

    let mut pongs = Vec::new();
    let mut beats = 0;
    while beats < 3 {
        match next_seen(&mut seen).await {
            Seen::Query(_) => {}
            Seen::Heartbeat => beats += 1,
            Seen::Pong(data) => pongs.push(data),
            other => panic!("Unexpected {:?}", other),
        }
    }
    assert_eq!(pongs, vec![b"gw".to_vec()]);

    client.disconnect().await;

    // Only lifecycle events and the hello reach the caller.
    let mut frames = 0;
    while let Ok(event) = events.try_recv() {
        if let GatewayEvent::Frame { frame, .. } = event {
            assert!(frame.is_hello());
            frames += 1;
        }
    }
    assert_eq!(frames, 1);
}
