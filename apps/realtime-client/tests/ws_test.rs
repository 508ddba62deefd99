//! End-to-end over a real socket: an in-process tokio-tungstenite server
//! standing in for the realtime gateway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{self, StatusCode};
use tokio_tungstenite::tungstenite::Message;

use realtime_client::{ConnectionState, RealtimeSession, SessionConfig};

const WAIT: Duration = Duration::from_secs(5);

struct Received {
    authorization: Option<String>,
    frames: Vec<Value>,
}

fn config_for(addr: std::net::SocketAddr) -> SessionConfig {
    SessionConfig {
        gateway_url: format!("ws://{addr}/realtime"),
        base_delay: Duration::from_millis(100),
        max_attempts: 2,
        handshake_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(60),
    }
}

/// Accept one client, acknowledge it, answer `join_room` with a chat message
/// and collect every frame until the client closes.
async fn serve_one(listener: TcpListener) -> Received {
    let (stream, _) = listener.accept().await.unwrap();

    let (auth_tx, auth_rx) = oneshot::channel();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = auth_tx.send(header);
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
    let authorization = auth_rx.await.unwrap();

    let ack = json!({ "t": "connection_ack", "d": { "status": "success", "message": "Connected successfully" } });
    ws.send(Message::Text(ack.to_string().into())).await.unwrap();

    let mut frames = Vec::new();
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else {
            if msg.is_close() {
                break;
            }
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        if frame["t"] == "join_room" {
            let ticket_id = frame["d"]["ticket_id"].clone();
            let reply = json!({
                "t": "new_message",
                "d": {
                    "id": 1,
                    "ticket_id": ticket_id,
                    "content": "printer is on fire",
                    "author": { "id": 3, "name": "Ana", "role": "usuario" },
                    "timestamp": "2024-05-01T10:00:00",
                    "message_type": "message",
                    "is_internal": false
                }
            });
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        }
        frames.push(frame);
    }

    Received {
        authorization,
        frames,
    }
}

#[tokio::test]
async fn websocket_session_joins_receives_and_leaves() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_one(listener));

    let session = RealtimeSession::websocket(config_for(addr), || Some("tok-ws".to_string()));
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    session.on_payload("new_message", move |msg: realtime_client::models::MessageRecord| {
        sink.lock().push(msg);
        Ok(())
    });

    session.connect();
    session.join_room(42);
    assert!(tokio::time::timeout(WAIT, session.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap());

    tokio::time::timeout(WAIT, async {
        while messages.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("new_message never arrived");

    session.disconnect().await;
    let received = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();

    assert_eq!(received.authorization.as_deref(), Some("Bearer tok-ws"));
    let commands: Vec<(&str, i64)> = received
        .frames
        .iter()
        .map(|f| (f["t"].as_str().unwrap(), f["d"]["ticket_id"].as_i64().unwrap_or(-1)))
        .collect();
    assert_eq!(commands, vec![("join_room", 42), ("leave_room", 42)]);

    let messages = messages.lock();
    assert_eq!(messages[0].ticket_id, 42);
    assert_eq!(messages[0].author.name, "Ana");
    assert!(messages[0].sent_at().is_some());
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unauthorized_upgrade_fails_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(Mutex::new(0usize));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            *counter.lock() += 1;
            let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                Err(http::Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .body(Some("invalid token".to_string()))
                    .unwrap())
            };
            let _ = tokio_tungstenite::accept_hdr_async(stream, reject).await;
        }
    });

    let session = RealtimeSession::websocket(config_for(addr), || Some("tok-expired".to_string()));
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    session.on("connection_failed", move |payload| {
        sink.lock().push(payload.clone());
        Ok(())
    });

    session.connect();
    assert!(tokio::time::timeout(WAIT, session.wait_for_state(ConnectionState::Failed))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(*accepted.lock(), 1);
    let notices = notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["reason"], "handshake_rejected");
}

#[tokio::test]
async fn unusable_gateway_url_fails_without_retry() {
    let mut config = config_for("127.0.0.1:1".parse().unwrap());
    config.gateway_url = "ftp://127.0.0.1/realtime".to_string();

    let session = RealtimeSession::websocket(config, || Some("tok-1".to_string()));
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    session.on("connection_state_changed", move |payload| {
        sink.lock().push(payload["state"].as_str().unwrap_or_default().to_string());
        Ok(())
    });
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    session.on("connection_failed", move |payload| {
        sink.lock().push(payload.clone());
        Ok(())
    });

    session.connect();
    assert!(tokio::time::timeout(WAIT, session.wait_for_state(ConnectionState::Failed))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*states.lock(), vec!["connecting", "failed"]);
    let notices = notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["reason"], "invalid_endpoint");
}
