#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use realtime_client::gateway::{Channel, ChannelEvent, Closure, Connector, InboundFrame, OutboundFrame};
use realtime_client::{RealtimeSession, SessionConfig, TransportError};

/// How the scripted gateway answers one connection attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Open and acknowledge the handshake.
    Accept,
    /// Open but never acknowledge.
    Silent,
    /// Fail the open as if the network were down.
    Refuse,
    /// Open and answer the handshake with `status: error`.
    RejectAck(&'static str),
    /// Open and send `server_error` instead of an acknowledgment.
    ServerErrorBeforeAck(&'static str),
    /// Open and send a `connection_ack` whose payload does not decode.
    MalformedAck,
}

/// One frame the client sent, tagged with the connection it went out on.
#[derive(Debug, Clone)]
pub struct Sent {
    pub connection: usize,
    pub command: String,
    pub data: Value,
}

#[derive(Default)]
struct State {
    script: VecDeque<Attempt>,
    opens: Vec<Instant>,
    tokens: Vec<String>,
    sent: Vec<Sent>,
    closes: usize,
    server_tx: Option<mpsc::UnboundedSender<ChannelEvent>>,
    ignore_heartbeats: bool,
}

/// In-memory stand-in for the realtime server. Unscripted attempts are accepted.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<State>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.state.lock().script.extend(attempts);
    }

    /// Stop answering heartbeats on current and future connections.
    pub fn ignore_heartbeats(&self) {
        self.state.lock().ignore_heartbeats = true;
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            state: self.state.clone(),
        })
    }

    /// Deliver a frame on the latest connection.
    pub fn push(&self, event: &str, data: Value) {
        self.emit(ChannelEvent::Frame(InboundFrame::new(event, data)));
    }

    pub fn drop_connection(&self) {
        self.emit(ChannelEvent::Closed(Closure::Network("connection reset".into())));
    }

    pub fn close_with(&self, code: u16, reason: &str) {
        self.emit(ChannelEvent::Closed(Closure::Server {
            code,
            reason: reason.to_string(),
        }));
    }

    fn emit(&self, event: ChannelEvent) {
        let state = self.state.lock();
        let tx = state.server_tx.as_ref().expect("no connection has been opened");
        let _ = tx.send(event);
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().opens.clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().tokens.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Everything sent except heartbeats.
    pub fn sent(&self) -> Vec<Sent> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.command != "heartbeat")
            .cloned()
            .collect()
    }

    /// `(command, ticket_id)` pairs, the shape most assertions want.
    pub fn commands(&self) -> Vec<(String, i64)> {
        self.sent()
            .into_iter()
            .map(|s| {
                let ticket_id = s.data["ticket_id"].as_i64().unwrap_or(-1);
                (s.command, ticket_id)
            })
            .collect()
    }

    pub fn heartbeats(&self) -> usize {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.command == "heartbeat")
            .count()
    }
}

struct MockConnector {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, credential: &str) -> Result<Box<dyn Channel>, TransportError> {
        let mut state = self.state.lock();
        state.opens.push(Instant::now());
        state.tokens.push(credential.to_string());
        let connection = state.opens.len();

        let attempt = state.script.pop_front().unwrap_or(Attempt::Accept);
        if matches!(attempt, Attempt::Refuse) {
            return Err(TransportError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match attempt {
            Attempt::Accept => {
                let ack = json!({ "status": "success", "message": "Connected successfully" });
                let _ = tx.send(ChannelEvent::Frame(InboundFrame::new("connection_ack", ack)));
            }
            Attempt::RejectAck(message) => {
                let ack = json!({ "status": "error", "message": message });
                let _ = tx.send(ChannelEvent::Frame(InboundFrame::new("connection_ack", ack)));
            }
            Attempt::ServerErrorBeforeAck(message) => {
                let err = json!({ "message": message });
                let _ = tx.send(ChannelEvent::Frame(InboundFrame::new("server_error", err)));
            }
            Attempt::MalformedAck => {
                let ack = json!({ "status": 7 });
                let _ = tx.send(ChannelEvent::Frame(InboundFrame::new("connection_ack", ack)));
            }
            Attempt::Silent | Attempt::Refuse => {}
        }
        state.server_tx = Some(tx.clone());

        Ok(Box::new(MockChannel {
            connection,
            inbound: rx,
            loopback: tx,
            state: self.state.clone(),
        }))
    }
}

struct MockChannel {
    connection: usize,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    loopback: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.sent.push(Sent {
            connection: self.connection,
            command: frame.t.to_string(),
            data: frame.d.clone(),
        });
        if frame.t == "heartbeat" && !state.ignore_heartbeats {
            let ack = InboundFrame::new("heartbeat_ack", json!({ "ack": frame.d["seq"] }));
            let _ = self.loopback.send(ChannelEvent::Frame(ack));
        }
        Ok(())
    }

    async fn recv(&mut self) -> ChannelEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => ChannelEvent::Closed(Closure::Network("mock gateway gone".into())),
        }
    }

    async fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

pub fn test_config() -> SessionConfig {
    SessionConfig {
        gateway_url: "ws://mock.invalid/realtime".to_string(),
        base_delay: Duration::from_secs(1),
        max_attempts: 5,
        handshake_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(30),
    }
}

pub fn start_session(gateway: &MockGateway, token: Option<&str>) -> RealtimeSession {
    start_session_with(test_config(), gateway, token)
}

pub fn start_session_with(
    config: SessionConfig,
    gateway: &MockGateway,
    token: Option<&str>,
) -> RealtimeSession {
    let token = token.map(str::to_string);
    RealtimeSession::spawn(config, gateway.connector(), Arc::new(move || token.clone()))
}

/// Let the controller drain whatever is queued. Cheap under a paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Collects the payloads of one event name.
pub fn record(session: &RealtimeSession, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on(event, move |payload| {
        sink.lock().push(payload.clone());
        Ok(())
    });
    seen
}

/// Collects the `state` field of every `connection_state_changed`.
pub fn record_states(session: &RealtimeSession) -> Arc<Mutex<Vec<String>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    session.on("connection_state_changed", move |payload| {
        sink.lock()
            .push(payload["state"].as_str().unwrap_or_default().to_string());
        Ok(())
    });
    states
}
