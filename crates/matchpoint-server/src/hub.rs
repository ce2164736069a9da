//! The room hub: fan-out of server events to connected members.
//!
//! Each connection task registers an unbounded sender per room it
//! occupies; its writer task drains the matching receiver onto the
//! socket. Sends are fire-and-forget: a member whose writer is gone is
//! simply skipped, the gateway's disconnect path handles the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use matchpoint_protocol::{ParticipantId, RoomKey, ServerEvent};

/// Routes [`ServerEvent`]s to the members of each room.
///
/// Cheap to clone; all clones share the routing table.
#[derive(Default)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<RoomKey, HashMap<ParticipantId, UnboundedSender<ServerEvent>>>>>,
}

impl Clone for RoomHub {
    fn clone(&self) -> Self {
        Self {
            rooms: Arc::clone(&self.rooms),
        }
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member's outbound channel for a room.
    pub fn register(
        &self,
        key: &RoomKey,
        participant: ParticipantId,
        tx: UnboundedSender<ServerEvent>,
    ) {
        let mut rooms = self.rooms.lock().expect("hub table poisoned");
        rooms.entry(key.clone()).or_default().insert(participant, tx);
    }

    /// Removes a member's channel; drops the room entry when empty.
    pub fn unregister(&self, key: &RoomKey, participant: ParticipantId) {
        let mut rooms = self.rooms.lock().expect("hub table poisoned");
        if let Some(members) = rooms.get_mut(key) {
            members.remove(&participant);
            if members.is_empty() {
                rooms.remove(key);
            }
        }
    }

    /// True if `tx`'s channel is the one currently registered for the
    /// member. A closing socket uses this to detect that a replacement
    /// connection has taken over its registration.
    pub fn holds(
        &self,
        key: &RoomKey,
        participant: ParticipantId,
        tx: &UnboundedSender<ServerEvent>,
    ) -> bool {
        let rooms = self.rooms.lock().expect("hub table poisoned");
        rooms
            .get(key)
            .and_then(|members| members.get(&participant))
            .is_some_and(|current| current.same_channel(tx))
    }

    /// Removes a whole room's routing entry.
    pub fn drop_room(&self, key: &RoomKey) {
        self.rooms.lock().expect("hub table poisoned").remove(key);
    }

    /// Sends an event to every registered member of a room.
    pub fn broadcast(&self, key: &RoomKey, event: ServerEvent) {
        let rooms = self.rooms.lock().expect("hub table poisoned");
        if let Some(members) = rooms.get(key) {
            for (participant, tx) in members {
                if tx.send(event.clone()).is_err() {
                    tracing::debug!(%participant, room_key = %key, "broadcast to dead writer");
                }
            }
        }
    }

    /// Sends an event to every member except `skip`.
    pub fn broadcast_except(&self, key: &RoomKey, skip: ParticipantId, event: ServerEvent) {
        let rooms = self.rooms.lock().expect("hub table poisoned");
        if let Some(members) = rooms.get(key) {
            for (participant, tx) in members {
                if *participant == skip {
                    continue;
                }
                if tx.send(event.clone()).is_err() {
                    tracing::debug!(%participant, room_key = %key, "broadcast to dead writer");
                }
            }
        }
    }
}
