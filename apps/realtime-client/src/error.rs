use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the underlying WebSocket channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("credential is not a valid header value")]
    InvalidCredential(#[from] tungstenite::http::header::InvalidHeaderValue),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("channel is closed")]
    Closed,
}

impl TransportError {
    /// Whether the server refused the upgrade itself (bad or revoked credential),
    /// as opposed to the network failing underneath us.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::WebSocket(tungstenite::Error::Http(response)) => {
                matches!(response.status().as_u16(), 401 | 403)
            }
            Self::InvalidCredential(_) => true,
            _ => false,
        }
    }

    /// The gateway URL itself is unusable (bad scheme, no host, TLS support
    /// missing). Retrying cannot help.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::WebSocket(tungstenite::Error::Url(_)))
    }
}

/// Session-level failure taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("handshake rejected by server: {0}")]
    HandshakeRejected(String),
    #[error("connection closed by server ({code}): {reason}")]
    ServerClosed { code: u16, reason: String },
    #[error("network connection dropped: {0}")]
    NetworkDropped(String),
    #[error("handshake not acknowledged within {0:?}")]
    TimedOut(Duration),
    #[error("gave up after {0} reconnect attempts")]
    RetryCeilingExceeded(u32),
    #[error("listener for `{event}` failed: {message}")]
    ListenerThrew { event: String, message: String },
    #[error("`{0}` dropped: not connected")]
    CommandWhileDisconnected(&'static str),
    #[error("no credential available")]
    MissingCredential,
    #[error("gateway url is unusable: {0}")]
    InvalidEndpoint(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        if err.is_rejection() {
            Self::HandshakeRejected(err.to_string())
        } else if err.is_misconfiguration() {
            Self::InvalidEndpoint(err.to_string())
        } else {
            Self::NetworkDropped(err.to_string())
        }
    }
}

impl SessionError {
    /// Retryable failures stay inside the controller's backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkDropped(_) | Self::TimedOut(_))
    }

    /// Short machine-readable code, used in the `connection_failed` notice.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::HandshakeRejected(_) => "handshake_rejected",
            Self::ServerClosed { .. } => "server_closed",
            Self::NetworkDropped(_) => "network_dropped",
            Self::TimedOut(_) => "timed_out",
            Self::RetryCeilingExceeded(_) => "retry_ceiling_exceeded",
            Self::ListenerThrew { .. } => "listener_threw",
            Self::CommandWhileDisconnected(_) => "command_while_disconnected",
            Self::MissingCredential => "missing_credential",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
        }
    }
}
