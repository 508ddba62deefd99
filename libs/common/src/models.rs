//! Payload shapes the helpdesk server pushes over the realtime channel.
//!
//! The realtime core routes frames by event name only; these types exist for
//! listeners that want a typed view of a payload.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user as embedded in message, typing and presence payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Ticket summary carried by `new_ticket` and `ticket_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub requester_id: Option<i64>,
    #[serde(default)]
    pub assigned_to_id: Option<i64>,
}

/// Chat message record carried by `new_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub ticket_id: i64,
    pub content: String,
    pub author: Participant,
    /// Server timestamp, ISO-8601 with or without an offset.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "message_type", alias = "type", default = "default_message_type")]
    pub kind: String,
    #[serde(default)]
    pub is_internal: bool,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl MessageRecord {
    /// Parse the server timestamp. Offset-less timestamps are taken as UTC.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// `message_notification`: a message landed in a ticket the user may not be viewing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNotification {
    pub ticket_id: i64,
    #[serde(default)]
    pub is_internal: bool,
}

/// `user_typing`: typing state of one user in one ticket room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub ticket_id: i64,
    #[serde(default)]
    pub user: Option<Participant>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub is_typing: bool,
}

impl TypingSignal {
    /// Name of the typing user; older servers send a bare `user_name`.
    pub fn display_name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|u| u.name.as_str())
            .or(self.user_name.as_deref())
    }
}

/// `joined_room` / `left_room` acknowledgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAck {
    pub ticket_id: i64,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `user_joined` / `user_left`: another participant entered or left the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceNotice {
    pub ticket_id: i64,
    pub user: Participant,
}

/// `connection_ack` status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// `connection_ack`: the server's answer to the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAck {
    #[serde(default = "default_ack_status")]
    pub status: AckStatus,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_ack_status() -> AckStatus {
    AckStatus::Success
}

/// `server_error`: a request was refused or failed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}
