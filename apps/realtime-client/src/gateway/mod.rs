pub mod backoff;
mod controller;
pub mod dispatch;
pub mod events;
pub mod room;
pub mod session;
pub mod transport;
pub mod typing;

pub use controller::RELOAD_NOTICE;
pub use dispatch::{Delivery, ListenerId, ListenerRegistry};
pub use events::{EventName, InboundFrame, InboundKind, OutboundFrame};
pub use session::{ConnectionState, CredentialProvider, RealtimeSession};
pub use transport::{Channel, ChannelEvent, Closure, Connector, WsConnector};
