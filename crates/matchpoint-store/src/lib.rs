//! Room records and keyed storage for Matchpoint.
//!
//! # Key types
//!
//! - [`Room`] / [`SlotRecord`] — the per-match record and its two seats
//! - [`RoomStore`] — durable keyed room storage (versioned writes)
//! - [`UserDirectory`] — the external user collaborator (profile lookup,
//!   rating + win/loss/draw persistence)
//! - [`MemoryRoomStore`] / [`MemoryUserDirectory`] — process-local
//!   implementations used by the server and by every test

mod error;
mod room;
mod store;
mod users;

pub use error::StoreError;
pub use room::{Room, SlotRecord};
pub use store::{MemoryRoomStore, RoomStore};
pub use users::{MemoryUserDirectory, UserDirectory, UserRecord};
