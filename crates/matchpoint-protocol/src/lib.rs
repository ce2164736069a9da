//! Wire protocol for Matchpoint.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Types** ([`ParticipantId`], [`RoomKey`], [`Slot`], [`Outcome`],
//!   [`MatchReport`], …) — the structures that travel on the wire.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]) — the closed sets of
//!   inbound operations and outbound replies/broadcasts.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how events become bytes.
//!
//! The protocol layer knows nothing about connections, rooms, or rating;
//! it only defines shapes.

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, ErrorKind, ServerEvent};
pub use types::{
    MatchReport, MatchScore, Outcome, ParticipantId, ParticipantSummary,
    RatingChange, RoomKey, Slot, GAME_POOL, ROOM_KEY_LEN, SET_COUNT,
};
