//! The `RoomStore` trait and its in-memory implementation.
//!
//! Storage is "last write wins" at the record level, but writes carry the
//! record version they were derived from: a stale write is rejected with
//! [`StoreError::VersionConflict`] instead of silently losing an update.
//! The engine serializes mutations per room key, so a conflict indicates
//! a bug in a caller, not an expected race.

use std::collections::HashMap;

use tokio::sync::Mutex;

use matchpoint_protocol::{ParticipantId, RoomKey};

use crate::{Room, StoreError};

/// Durable keyed storage for room records.
pub trait RoomStore: Send + Sync + 'static {
    /// Looks up a room by key.
    fn find(
        &self,
        key: &RoomKey,
    ) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Inserts a new room. Fails with [`StoreError::KeyTaken`] if a live
    /// room already holds the key.
    fn insert(
        &self,
        room: Room,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes back a mutated room. The write succeeds only if `room.version`
    /// matches the stored version; the stored version is then bumped.
    /// Returns the room as stored (with the new version).
    fn update(
        &self,
        room: Room,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Deletes a room by key. Deleting an absent key is not an error.
    fn delete(
        &self,
        key: &RoomKey,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Finds the room a participant is currently a member of, if any.
    fn find_by_member(
        &self,
        participant: ParticipantId,
    ) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;
}

/// Process-local [`RoomStore`] backed by a `HashMap`.
///
/// Durability is out of scope for the base design; this is the store the
/// server runs with, and the one every test uses.
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<RoomKey, Room>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rooms.
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

impl RoomStore for MemoryRoomStore {
    async fn find(&self, key: &RoomKey) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.lock().await.get(key).cloned())
    }

    async fn insert(&self, room: Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(&room.key) {
            return Err(StoreError::KeyTaken(room.key));
        }
        tracing::debug!(room_key = %room.key, "room record inserted");
        rooms.insert(room.key.clone(), room);
        Ok(())
    }

    async fn update(&self, mut room: Room) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().await;
        let stored = rooms
            .get_mut(&room.key)
            .ok_or_else(|| StoreError::RoomNotFound(room.key.clone()))?;
        if stored.version != room.version {
            return Err(StoreError::VersionConflict(room.key));
        }
        room.version += 1;
        *stored = room.clone();
        Ok(room)
    }

    async fn delete(&self, key: &RoomKey) -> Result<(), StoreError> {
        if self.rooms.lock().await.remove(key).is_some() {
            tracing::debug!(room_key = %key, "room record deleted");
        }
        Ok(())
    }

    async fn find_by_member(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<Room>, StoreError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms
            .values()
            .find(|r| r.slot_of(participant).is_some())
            .cloned())
    }
}

// =========================================================================
// Tests
// =========================================================================
