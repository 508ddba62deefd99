//! Ticket room membership: at most one room per session.

use helpdesk_common::ticket_room;

/// Whether the join for a handle has gone out on the current channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Requested while offline or lost with the connection; joined on connect.
    Pending,
    Joined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub ticket_id: i64,
    pub room: String,
    pub membership: Membership,
}

impl RoomHandle {
    fn new(ticket_id: i64, membership: Membership) -> Self {
        Self {
            ticket_id,
            room: ticket_room(ticket_id),
            membership,
        }
    }
}

/// A command the tracker wants emitted, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCommand {
    Join(i64),
    Leave(i64),
}

/// Outcome of [`RoomTracker::join`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomSwitch {
    /// The room given up, whether or not a leave goes out for it.
    pub replaced: Option<i64>,
    pub commands: Vec<RoomCommand>,
}

/// Tracks the single active room. Pure bookkeeping: the controller emits the
/// returned commands.
#[derive(Debug, Default)]
pub struct RoomTracker {
    active: Option<RoomHandle>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&RoomHandle> {
        self.active.as_ref()
    }

    pub fn ticket_id(&self) -> Option<i64> {
        self.active.as_ref().map(|h| h.ticket_id)
    }

    /// Switch to `ticket_id`'s room. Any previous room is left first.
    pub fn join(&mut self, ticket_id: i64, connected: bool) -> RoomSwitch {
        if self.ticket_id() == Some(ticket_id) {
            return RoomSwitch::default();
        }

        let mut commands = Vec::with_capacity(2);
        let replaced = self.active.take().map(|old| {
            if connected && old.membership == Membership::Joined {
                commands.push(RoomCommand::Leave(old.ticket_id));
            }
            old.ticket_id
        });

        if connected {
            commands.push(RoomCommand::Join(ticket_id));
            self.active = Some(RoomHandle::new(ticket_id, Membership::Joined));
        } else {
            self.active = Some(RoomHandle::new(ticket_id, Membership::Pending));
        }
        RoomSwitch { replaced, commands }
    }

    /// Drop the active room. Returns the leave to emit, if the server knows
    /// about the membership.
    pub fn leave(&mut self, connected: bool) -> Option<RoomCommand> {
        let old = self.active.take()?;
        (connected && old.membership == Membership::Joined).then_some(RoomCommand::Leave(old.ticket_id))
    }

    /// Called once a (re)connection is acknowledged.
    pub fn on_connected(&mut self) -> Option<RoomCommand> {
        let handle = self.active.as_mut()?;
        handle.membership = Membership::Joined;
        Some(RoomCommand::Join(handle.ticket_id))
    }

    /// The channel died; the room must be re-joined on the next connection.
    pub fn on_connection_lost(&mut self) {
        if let Some(handle) = self.active.as_mut() {
            handle.membership = Membership::Pending;
        }
    }
}
