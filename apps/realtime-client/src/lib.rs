pub mod config;
pub mod error;
pub mod gateway;

pub use config::SessionConfig;
pub use error::{SessionError, TransportError};
pub use gateway::{ConnectionState, EventName, RealtimeSession};

/// Domain payload models, re-exported for listeners.
pub use helpdesk_common::models;
