use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = helpdesk_common::id::prefixed_ulid("rts");
/// assert!(id.starts_with("rts_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Client-side realtime session, used to correlate log lines.
    pub const REALTIME_SESSION: &str = "rts";
}

/// Server-side room name for a ticket's event stream.
pub fn ticket_room(ticket_id: i64) -> String {
    format!("ticket_{ticket_id}")
}
