//! Ephemeral "who is typing" state, last write wins per (ticket, user).

use std::collections::{BTreeSet, HashMap};

use helpdesk_common::models::TypingSignal;

#[derive(Debug, Default)]
pub struct TypingBoard {
    rooms: HashMap<i64, BTreeSet<String>>,
}

impl TypingBoard {
    pub fn apply(&mut self, signal: &TypingSignal) {
        let Some(name) = signal.display_name() else {
            return;
        };
        if signal.is_typing {
            self.rooms
                .entry(signal.ticket_id)
                .or_default()
                .insert(name.to_string());
        } else if let Some(users) = self.rooms.get_mut(&signal.ticket_id) {
            users.remove(name);
            if users.is_empty() {
                self.rooms.remove(&signal.ticket_id);
            }
        }
    }

    /// Users currently typing in `ticket_id`, sorted by name.
    pub fn typing_users(&self, ticket_id: i64) -> Vec<String> {
        self.rooms
            .get(&ticket_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_room(&mut self, ticket_id: i64) {
        self.rooms.remove(&ticket_id);
    }
}
