//! Realtime event names and wire-format frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Inbound event names
// ---------------------------------------------------------------------------

/// Event names received from the server, plus the pseudo-events the session
/// dispatches itself.
pub struct EventName;

impl EventName {
    pub const NEW_TICKET: &'static str = "new_ticket";
    pub const TICKET_UPDATED: &'static str = "ticket_updated";
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const MESSAGE_NOTIFICATION: &'static str = "message_notification";
    pub const USER_TYPING: &'static str = "user_typing";
    pub const JOINED_ROOM: &'static str = "joined_room";
    pub const LEFT_ROOM: &'static str = "left_room";
    pub const USER_JOINED: &'static str = "user_joined";
    pub const USER_LEFT: &'static str = "user_left";
    pub const CONNECTION_ACK: &'static str = "connection_ack";
    pub const SERVER_ERROR: &'static str = "server_error";
    pub const HEARTBEAT_ACK: &'static str = "heartbeat_ack";

    /// Dispatched on every connectivity state change.
    pub const CONNECTION_STATE_CHANGED: &'static str = "connection_state_changed";
    /// Dispatched once per fatal failure; the UI should ask for a reload.
    pub const CONNECTION_FAILED: &'static str = "connection_failed";
}

/// Routing class of an inbound frame, derived from its event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    NewTicket,
    TicketUpdated,
    NewMessage,
    MessageNotification,
    UserTyping,
    JoinedRoom,
    LeftRoom,
    UserJoined,
    UserLeft,
    ConnectionAck,
    ServerError,
    HeartbeatAck,
    Other,
}

impl InboundKind {
    pub fn of(event: &str) -> Self {
        match event {
            EventName::NEW_TICKET => Self::NewTicket,
            EventName::TICKET_UPDATED => Self::TicketUpdated,
            EventName::NEW_MESSAGE => Self::NewMessage,
            EventName::MESSAGE_NOTIFICATION => Self::MessageNotification,
            EventName::USER_TYPING => Self::UserTyping,
            EventName::JOINED_ROOM => Self::JoinedRoom,
            EventName::LEFT_ROOM => Self::LeftRoom,
            EventName::USER_JOINED => Self::UserJoined,
            EventName::USER_LEFT => Self::UserLeft,
            EventName::CONNECTION_ACK => Self::ConnectionAck,
            EventName::SERVER_ERROR => Self::ServerError,
            EventName::HEARTBEAT_ACK => Self::HeartbeatAck,
            _ => Self::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client frame
// ---------------------------------------------------------------------------

/// One frame received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub t: String,
    #[serde(default)]
    pub d: Value,
}

impl InboundFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            t: event.to_string(),
            d: data,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> InboundKind {
        InboundKind::of(&self.t)
    }

    /// Ticket the payload refers to, if it carries one.
    pub fn ticket_id(&self) -> Option<i64> {
        self.d.get("ticket_id").and_then(Value::as_i64)
    }

    /// Human-readable `message` field, used by acks and errors.
    pub fn message(&self) -> Option<&str> {
        self.d.get("message").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Client → Server frame
// ---------------------------------------------------------------------------

/// Outbound command names.
pub struct CommandName;

impl CommandName {
    pub const JOIN_ROOM: &'static str = "join_room";
    pub const LEAVE_ROOM: &'static str = "leave_room";
    pub const SEND_MESSAGE: &'static str = "send_message";
    pub const TYPING: &'static str = "typing";
    pub const HEARTBEAT: &'static str = "heartbeat";
}

/// One frame sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub t: &'static str,
    pub d: Value,
}

impl OutboundFrame {
    pub fn join_room(ticket_id: i64) -> Self {
        Self {
            t: CommandName::JOIN_ROOM,
            d: json!({ "ticket_id": ticket_id }),
        }
    }

    pub fn leave_room(ticket_id: i64) -> Self {
        Self {
            t: CommandName::LEAVE_ROOM,
            d: json!({ "ticket_id": ticket_id }),
        }
    }

    pub fn send_message(ticket_id: i64, content: &str, is_internal: bool) -> Self {
        Self {
            t: CommandName::SEND_MESSAGE,
            d: json!({
                "ticket_id": ticket_id,
                "content": content,
                "is_internal": is_internal,
            }),
        }
    }

    pub fn typing(ticket_id: i64, user_name: &str, is_typing: bool) -> Self {
        Self {
            t: CommandName::TYPING,
            d: json!({
                "ticket_id": ticket_id,
                "user_name": user_name,
                "is_typing": is_typing,
            }),
        }
    }

    pub fn heartbeat(seq: u64) -> Self {
        Self {
            t: CommandName::HEARTBEAT,
            d: json!({ "seq": seq }),
        }
    }

    /// Ticket the command refers to, if any.
    pub fn ticket_id(&self) -> Option<i64> {
        self.d.get("ticket_id").and_then(Value::as_i64)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
