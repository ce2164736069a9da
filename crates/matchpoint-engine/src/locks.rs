//! Per-room serialization.
//!
//! Every read-modify-write against a room record happens inside that
//! room's critical section. Two participants in the same room acting
//! concurrently is the steady state; operations on different rooms never
//! contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use matchpoint_protocol::RoomKey;

/// A registry of per-room-key locks.
///
/// The registry itself is only held long enough to fetch or create the
/// room's lock; callers then await the room lock without blocking other
/// rooms.
#[derive(Default)]
pub struct RoomLocks {
    locks: Mutex<HashMap<RoomKey, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the critical section for one room key.
    ///
    /// The returned guard owns the lock; hold it across the full
    /// read-modify-write sequence and drop it before any broadcast.
    pub async fn acquire(&self, key: &RoomKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the registry entry for a deleted room.
    ///
    /// Safe to call while the room's guard is still held — the `Arc`
    /// keeps the lock alive until the guard drops. A later `acquire`
    /// for the same key simply creates a fresh lock.
    pub async fn discard(&self, key: &RoomKey) {
        self.locks.lock().await.remove(key);
    }

    /// Number of registered room locks.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
