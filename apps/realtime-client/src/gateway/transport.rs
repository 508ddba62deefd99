//! Channel abstraction and its WebSocket implementation.
//!
//! The controller only sees [`Connector`] and [`Channel`]; framing, TLS and
//! the upgrade handshake live in `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

use super::events::{InboundFrame, OutboundFrame};

/// Close codes the server uses to refuse a client outright.
const APPLICATION_CLOSE_CODES: std::ops::RangeInclusive<u16> = 4000..=4999;

/// Why a channel stopped delivering frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    /// The server closed the channel deliberately (e.g. revoked credential).
    Server { code: u16, reason: String },
    /// The connection went away underneath us.
    Network(String),
}

impl Closure {
    /// Classify a close frame by its status code.
    pub fn from_close_code(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if APPLICATION_CLOSE_CODES.contains(&code) || code == u16::from(CloseCode::Policy) {
            Self::Server { code, reason }
        } else {
            Self::Network(format!("closed with status {code}: {reason}"))
        }
    }
}

/// What a channel yields on every read.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Frame(InboundFrame),
    Closed(Closure),
}

/// Opens channels to the realtime server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a channel, presenting `credential` during the handshake.
    async fn open(&self, credential: &str) -> Result<Box<dyn Channel>, TransportError>;
}

/// An open bidirectional channel.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError>;

    /// Next frame or the closure. Must be cancel-safe: the controller drops
    /// this future whenever another event wins the select.
    async fn recv(&mut self) -> ChannelEvent;

    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Connects to the gateway over WebSocket, sending the credential as a
/// bearer `Authorization` header on the upgrade request.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        // rustls needs a process-wide provider before the first `wss://` handshake.
        // Ignore the error if one is already installed.
        rustls::crypto::ring::default_provider().install_default().ok();
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, credential: &str) -> Result<Box<dyn Channel>, TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {credential}"))?);

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url = %self.url, status = %response.status(), "websocket upgraded");

        Ok(Box::new(WsChannel { stream }))
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let json = frame.to_json()?;
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> ChannelEvent {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return ChannelEvent::Closed(Closure::Network(e.to_string())),
                None => return ChannelEvent::Closed(Closure::Network("stream ended".into())),
            };

            match msg {
                Message::Text(text) => match InboundFrame::parse(text.as_str()) {
                    Ok(frame) => return ChannelEvent::Frame(frame),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unparsable frame");
                    }
                },
                Message::Close(Some(frame)) => {
                    return ChannelEvent::Closed(Closure::from_close_code(
                        u16::from(frame.code),
                        frame.reason.as_str(),
                    ));
                }
                Message::Close(None) => {
                    return ChannelEvent::Closed(Closure::Network("closed without status".into()));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "websocket close failed");
        }
    }
}
