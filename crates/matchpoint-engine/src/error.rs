//! Error types for the match core.

use matchpoint_protocol::{ParticipantId, RoomKey};
use matchpoint_store::StoreError;

/// Errors surfaced by lifecycle and engine operations.
///
/// Operations never leave a room partially updated: the per-room critical
/// section plus versioned persistence means an `Err` implies no visible
/// state change.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No room with that key exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomKey),

    /// The room already has two members.
    #[error("room {0} is full")]
    RoomFull(RoomKey),

    /// The participant is not a member of the room.
    #[error("participant {0} is not a member of room {1}")]
    NotAMember(ParticipantId, RoomKey),

    /// Out-of-range set index or similar caller mistake. Surfaced as a
    /// structured rejection rather than swallowed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The match has already ended; scoring mutations are frozen.
    #[error("match in room {0} has already ended")]
    AlreadyEnded(RoomKey),

    /// A storage fault. The only legitimate retry target.
    #[error(transparent)]
    Store(#[from] StoreError),
}
