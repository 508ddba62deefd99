//! Controller task: owns the channel and drives connect, handshake,
//! heartbeat, backoff and room re-join.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use helpdesk_common::models::{AckStatus, ConnectionAck, TypingSignal};

use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};

use super::backoff::{BackoffPolicy, ReconnectState, RetryDecision};
use super::events::{EventName, InboundFrame, InboundKind, OutboundFrame};
use super::room::{RoomCommand, RoomTracker};
use super::session::{Command, ConnectionState, CredentialProvider, Shared};
use super::transport::{Channel, ChannelEvent, Closure, Connector};

/// Shown to the user when the session gives up.
pub const RELOAD_NOTICE: &str = "connection lost, reload required";

type PendingOpen = Pin<Box<dyn Future<Output = Result<Box<dyn Channel>, TransportError>> + Send>>;

pub(crate) struct Controller {
    shared: Arc<Shared>,
    config: SessionConfig,
    policy: BackoffPolicy,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,

    /// Present from a successful open until the channel is dropped.
    channel: Option<Box<dyn Channel>>,
    pending_open: Option<PendingOpen>,
    rooms: RoomTracker,
    reconnect: ReconnectState,

    retry_at: Option<Instant>,
    /// Set while an attempt is waiting for `connection_ack`.
    handshake_deadline: Option<Instant>,
    heartbeat_at: Option<Instant>,
    heartbeat_seq: u64,
    awaiting_heartbeat_ack: bool,
}

impl Controller {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            shared,
            policy: BackoffPolicy::from_config(&config),
            config,
            connector,
            credentials,
            commands,
            state_tx,
            state: ConnectionState::Disconnected,
            channel: None,
            pending_open: None,
            rooms: RoomTracker::new(),
            reconnect: ReconnectState::default(),
            retry_at: None,
            handshake_deadline: None,
            heartbeat_at: None,
            heartbeat_seq: 0,
            awaiting_heartbeat_ack: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown(done)) => {
                        self.teardown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },

                opened = poll_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_opened(opened).await;
                }

                event = next_event(&mut self.channel) => self.on_channel_event(event).await,

                () = sleep_until(self.handshake_deadline) => {
                    let timeout = self.config.handshake_timeout;
                    self.fail_attempt(SessionError::TimedOut(timeout)).await;
                }

                () = sleep_until(self.heartbeat_at) => self.on_heartbeat_due().await,

                () = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.start_attempt();
                }
            }
        }
        tracing::info!("realtime session ended");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        let connected = self.state == ConnectionState::Connected;
        match cmd {
            Command::Connect => match self.state {
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    self.reconnect.reset();
                    self.start_attempt();
                }
                state => tracing::debug!(state = state.as_str(), "connect ignored"),
            },
            Command::Disconnect(done) => {
                self.disconnect_now().await;
                let _ = done.send(());
            }
            Command::JoinRoom(ticket_id) => {
                if !connected {
                    tracing::warn!(ticket_id, "not connected; room will be joined once connected");
                }
                let switch = self.rooms.join(ticket_id, connected);
                if let Some(old) = switch.replaced {
                    self.shared.typing.lock().clear_room(old);
                }
                for room_cmd in switch.commands {
                    if !self.emit_room(room_cmd).await {
                        break;
                    }
                }
            }
            Command::LeaveRoom => {
                let Some(ticket_id) = self.rooms.ticket_id() else {
                    return;
                };
                match self.rooms.leave(connected) {
                    Some(room_cmd) => {
                        self.emit_room(room_cmd).await;
                    }
                    None => {
                        self.shared.typing.lock().clear_room(ticket_id);
                        tracing::warn!(ticket_id, "not connected; forgetting room without leave");
                    }
                }
            }
            Command::SendMessage {
                ticket_id,
                content,
                is_internal,
            } => {
                if !connected {
                    let err = SessionError::CommandWhileDisconnected("send_message");
                    tracing::warn!(ticket_id, error = %err, "command dropped");
                    return;
                }
                self.send_frame(OutboundFrame::send_message(ticket_id, &content, is_internal))
                    .await;
            }
            Command::SendTyping {
                ticket_id,
                user_name,
                is_typing,
            } => {
                if !connected {
                    let err = SessionError::CommandWhileDisconnected("send_typing");
                    tracing::warn!(ticket_id, error = %err, "command dropped");
                    return;
                }
                self.send_frame(OutboundFrame::typing(ticket_id, &user_name, is_typing))
                    .await;
            }
            // Handled in `run`.
            Command::Shutdown(_) => {}
        }
    }

    /// Emit a room command. Returns `false` if the channel died.
    async fn emit_room(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join(ticket_id) => {
                tracing::info!(ticket_id, "joining ticket room");
                self.send_frame(OutboundFrame::join_room(ticket_id)).await
            }
            RoomCommand::Leave(ticket_id) => {
                tracing::info!(ticket_id, "leaving ticket room");
                self.shared.typing.lock().clear_room(ticket_id);
                self.send_frame(OutboundFrame::leave_room(ticket_id)).await
            }
        }
    }

    /// Send on the open channel. A send failure counts as a network drop.
    async fn send_frame(&mut self, frame: OutboundFrame) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };
        tracing::trace!(command = frame.t, ticket_id = ?frame.ticket_id(), "sending frame");
        match channel.send(&frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(command = frame.t, ticket_id = ?frame.ticket_id(), error = %e, "send failed");
                self.on_closed(Closure::Network(e.to_string())).await;
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    fn start_attempt(&mut self) {
        let Some(token) = self.credentials.token() else {
            tracing::warn!(error = %SessionError::MissingCredential, "not opening a channel");
            self.reconnect.reset();
            if self.state != ConnectionState::Disconnected {
                self.set_state(ConnectionState::Disconnected);
            }
            return;
        };

        tracing::debug!(attempt = self.reconnect.attempt(), "opening channel");
        let connector = self.connector.clone();
        self.pending_open = Some(Box::pin(async move { connector.open(&token).await }));
        self.handshake_deadline = Some(Instant::now() + self.config.handshake_timeout);

        if self.state != ConnectionState::Reconnecting {
            self.set_state(ConnectionState::Connecting);
        }
    }

    async fn on_opened(&mut self, opened: Result<Box<dyn Channel>, TransportError>) {
        match opened {
            Ok(channel) => {
                tracing::debug!("channel open; awaiting acknowledgment");
                self.channel = Some(channel);
            }
            Err(e) => self.on_failure(e.into()).await,
        }
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.on_frame(frame).await,
            ChannelEvent::Closed(closure) => self.on_closed(closure).await,
        }
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        let handshaking = self.handshake_deadline.is_some();
        match frame.kind() {
            InboundKind::ConnectionAck if handshaking => {
                let ack: ConnectionAck = match serde_json::from_value(frame.d.clone()) {
                    Ok(ack) => ack,
                    Err(e) => {
                        self.fail(SessionError::HandshakeRejected(format!("malformed ack: {e}")))
                            .await;
                        return;
                    }
                };
                if ack.status == AckStatus::Error {
                    let reason = ack.message.unwrap_or_else(|| "rejected".to_string());
                    self.fail(SessionError::HandshakeRejected(reason)).await;
                    return;
                }
                self.on_handshake_complete().await;
            }
            InboundKind::ServerError if handshaking => {
                let reason = frame.message().unwrap_or("rejected").to_string();
                self.fail(SessionError::HandshakeRejected(reason)).await;
                return;
            }
            InboundKind::ServerError => {
                tracing::warn!(detail = frame.message().unwrap_or_default(), "server error");
            }
            InboundKind::HeartbeatAck => {
                self.awaiting_heartbeat_ack = false;
                return;
            }
            InboundKind::UserTyping => match serde_json::from_value::<TypingSignal>(frame.d.clone()) {
                Ok(signal) => self.shared.typing.lock().apply(&signal),
                Err(e) => tracing::debug!(error = %e, "malformed typing signal"),
            },
            _ => {}
        }

        tracing::trace!(event = %frame.t, ticket_id = ?frame.ticket_id(), "dispatching frame");
        self.dispatch(&frame.t, &frame.d);
    }

    /// Handshake acknowledged. The room re-join goes out in this same step,
    /// before any queued command is looked at.
    async fn on_handshake_complete(&mut self) {
        self.handshake_deadline = None;
        self.reconnect.reset();
        self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
        self.awaiting_heartbeat_ack = false;
        self.set_state(ConnectionState::Connected);

        if let Some(room_cmd) = self.rooms.on_connected() {
            self.emit_room(room_cmd).await;
        }
    }

    async fn on_closed(&mut self, closure: Closure) {
        if self.state == ConnectionState::Connected {
            self.rooms.on_connection_lost();
            // Typing signals sent during the outage are never seen.
            if let Some(ticket_id) = self.rooms.ticket_id() {
                self.shared.typing.lock().clear_room(ticket_id);
            }
        }
        let err = match closure {
            Closure::Server { code, reason } if self.handshake_deadline.is_some() => {
                SessionError::HandshakeRejected(format!("{reason} ({code})"))
            }
            Closure::Server { code, reason } => SessionError::ServerClosed { code, reason },
            Closure::Network(reason) => SessionError::NetworkDropped(reason),
        };
        self.on_failure(err).await;
    }

    async fn on_failure(&mut self, err: SessionError) {
        if err.is_retryable() {
            self.fail_attempt(err).await;
        } else {
            self.fail(err).await;
        }
    }

    async fn on_heartbeat_due(&mut self) {
        if self.awaiting_heartbeat_ack {
            tracing::warn!(seq = self.heartbeat_seq, "heartbeat not acknowledged");
            self.on_closed(Closure::Network("heartbeat timeout".into())).await;
            return;
        }
        self.heartbeat_seq += 1;
        self.awaiting_heartbeat_ack = true;
        self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
        self.send_frame(OutboundFrame::heartbeat(self.heartbeat_seq)).await;
    }

    /// A retryable failure: drop the channel and schedule the next attempt.
    async fn fail_attempt(&mut self, err: SessionError) {
        self.drop_channel().await;
        match self.reconnect.next(&self.policy) {
            RetryDecision::Retry { attempt, delay } => {
                tracing::warn!(
                    error = %err,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "connection failed; reconnect scheduled"
                );
                self.retry_at = Some(Instant::now() + delay);
                self.set_state(ConnectionState::Reconnecting);
            }
            RetryDecision::GiveUp { attempts } => {
                tracing::warn!(error = %err, "last reconnect attempt failed");
                self.fail(SessionError::RetryCeilingExceeded(attempts)).await;
            }
        }
    }

    /// A fatal failure: no retry, one notice, state Failed.
    async fn fail(&mut self, err: SessionError) {
        self.drop_channel().await;
        self.retry_at = None;
        tracing::error!(error = %err, "realtime connection failed");
        self.set_state(ConnectionState::Failed);
        self.dispatch(
            EventName::CONNECTION_FAILED,
            &json!({
                "reason": err.reason_code(),
                "detail": err.to_string(),
                "message": RELOAD_NOTICE,
            }),
        );
    }

    async fn disconnect_now(&mut self) {
        let connected = self.state == ConnectionState::Connected;
        if let Some(ticket_id) = self.rooms.ticket_id() {
            match self.rooms.leave(connected) {
                Some(room_cmd) => {
                    self.emit_room(room_cmd).await;
                }
                None => self.shared.typing.lock().clear_room(ticket_id),
            }
        }

        self.drop_channel().await;
        self.retry_at = None;
        self.reconnect.reset();
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    async fn teardown(&mut self) {
        self.disconnect_now().await;
        self.commands.close();
    }

    /// Close the channel and clear every connection-scoped timer.
    async fn drop_channel(&mut self) {
        self.pending_open = None;
        self.handshake_deadline = None;
        self.heartbeat_at = None;
        self.awaiting_heartbeat_ack = false;
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state;
        self.state = state;
        self.state_tx.send_replace(state);

        tracing::info!(
            from = previous.as_str(),
            to = state.as_str(),
            attempt = self.reconnect.attempt(),
            "connection state changed"
        );
        self.dispatch(
            EventName::CONNECTION_STATE_CHANGED,
            &json!({
                "state": state,
                "previous": previous,
                "attempt": self.reconnect.attempt(),
            }),
        );
    }

    fn dispatch(&self, event: &str, payload: &serde_json::Value) {
        let delivery = self.shared.listeners.dispatch(event, payload);
        if delivery.failed > 0 {
            tracing::debug!(
                event,
                delivered = delivery.delivered,
                failed = delivery.failed,
                "some listeners failed"
            );
        }
    }
}

async fn poll_open(
    pending: &mut Option<PendingOpen>,
) -> Result<Box<dyn Channel>, TransportError> {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_event(channel: &mut Option<Box<dyn Channel>>) -> ChannelEvent {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
