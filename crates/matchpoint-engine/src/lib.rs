//! Room lifecycle and match resolution for matchpoint.
//!
//! Two services share a per-room lock registry over the versioned store:
//!
//! - [`RoomLifecycle`] creates, joins, and leaves rooms, including the
//!   forfeiture path when a participant abandons a live match.
//! - [`MatchEngine`] drives the per-set readiness barriers, scoring,
//!   set resolution, and the terminal match report with Elo settlement.

mod engine;
mod error;
mod lifecycle;
mod locks;
mod rating;

pub use engine::{
    MatchEngine, MatchStart, MatchStatus, Scoreboard, SetEnd, SetStart, SubmitRecord,
};
pub use error::EngineError;
pub use lifecycle::{LeaveOutcome, RoomLifecycle};
pub use locks::RoomLocks;
pub use rating::{adjust, RatingService};
