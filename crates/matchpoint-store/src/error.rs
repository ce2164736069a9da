//! Error types for the storage layer.

use matchpoint_protocol::{ParticipantId, RoomKey};

/// Errors that can occur against the room store or user directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No room with that key exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomKey),

    /// No profile exists for the participant.
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    /// A live room already holds this key.
    #[error("room key {0} already taken")]
    KeyTaken(RoomKey),

    /// The write was derived from a stale record version.
    #[error("stale write for room {0}")]
    VersionConflict(RoomKey),

    /// The backing store could not be reached. Transient; retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
