//! Public session handle: lifecycle, room and chat commands, listener registration.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use helpdesk_common::id::{prefix, prefixed_ulid};

use crate::config::SessionConfig;

use super::controller::Controller;
use super::dispatch::{ListenerId, ListenerRegistry};
use super::transport::{Connector, WsConnector};
use super::typing::TypingBoard;

/// Connectivity of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

/// Supplies the bearer token. Read on every connection attempt, so a refreshed
/// token is picked up by the next reconnect.
pub trait CredentialProvider: Send + Sync + 'static {
    fn token(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Requests from the handle to the controller task.
pub(crate) enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    JoinRoom(i64),
    LeaveRoom,
    SendMessage {
        ticket_id: i64,
        content: String,
        is_internal: bool,
    },
    SendTyping {
        ticket_id: i64,
        user_name: String,
        is_typing: bool,
    },
    Shutdown(oneshot::Sender<()>),
}

/// State shared between the handle and the controller task.
pub(crate) struct Shared {
    pub(crate) session_id: String,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) typing: Mutex<TypingBoard>,
}

/// Handle to one realtime session.
///
/// Cloning is cheap; all clones drive the same controller task. When the last
/// clone is dropped the task leaves the active room, closes the channel and
/// exits. Every command returns immediately; results are observed through
/// listeners and [`RealtimeSession::state`].
///
/// Listeners are owned by the session, so a listener that captures a clone
/// keeps the session alive forever. Such sessions must be stopped with
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct RealtimeSession {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl RealtimeSession {
    /// Start a session over WebSocket to `config.gateway_url`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn websocket(config: SessionConfig, credentials: impl CredentialProvider) -> Self {
        let connector = WsConnector::new(config.gateway_url.clone());
        Self::spawn(config, Arc::new(connector), Arc::new(credentials))
    }

    /// Start a session over an arbitrary connector.
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let shared = Arc::new(Shared {
            session_id: prefixed_ulid(prefix::REALTIME_SESSION),
            listeners: ListenerRegistry::new(),
            typing: Mutex::new(TypingBoard::default()),
        });
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let span = tracing::info_span!("realtime_session", session_id = %shared.session_id);
        let controller = Controller::new(
            shared.clone(),
            config,
            connector,
            credentials,
            commands_rx,
            state_tx,
        );
        tokio::spawn(controller.run().instrument(span));

        Self {
            shared,
            commands: commands_tx,
            state: state_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the channel. No-op while connected or already connecting.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Leave the active room, close the channel and cancel every pending
    /// timer. Resolves once the controller has done so.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Disconnect(tx));
        let _ = rx.await;
    }

    /// Like [`disconnect`](Self::disconnect), then stop the controller task.
    /// Later commands on any clone are ignored.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx));
        let _ = rx.await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target`. Returns `false` if the
    /// controller stopped first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|state| *state == target).await.is_ok();
        reached
    }

    // -----------------------------------------------------------------------
    // Rooms and chat
    // -----------------------------------------------------------------------

    /// Subscribe to `ticket_id`'s room, leaving the current one first. While
    /// offline the room is remembered and joined once connected.
    pub fn join_room(&self, ticket_id: i64) {
        self.send(Command::JoinRoom(ticket_id));
    }

    pub fn leave_room(&self) {
        self.send(Command::LeaveRoom);
    }

    /// Dropped with a warning while not connected.
    pub fn send_message(&self, ticket_id: i64, content: impl Into<String>, is_internal: bool) {
        self.send(Command::SendMessage {
            ticket_id,
            content: content.into(),
            is_internal,
        });
    }

    /// Dropped with a warning while not connected.
    pub fn send_typing(&self, ticket_id: i64, user_name: impl Into<String>, is_typing: bool) {
        self.send(Command::SendTyping {
            ticket_id,
            user_name: user_name.into(),
            is_typing,
        });
    }

    /// Users the server last reported as typing in `ticket_id`.
    pub fn typing_users(&self, ticket_id: i64) -> Vec<String> {
        self.shared.typing.lock().typing_users(ticket_id)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.on(event, callback)
    }

    pub fn on_payload<T, F>(&self, event: &str, callback: F) -> ListenerId
    where
        T: DeserializeOwned,
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.on_payload(event, callback)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.shared.listeners.off(event, id)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!(session_id = %self.shared.session_id, "session stopped; command ignored");
        }
    }
}
