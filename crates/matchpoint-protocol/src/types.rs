//! Core protocol types shared by every Matchpoint layer.
//!
//! A match is a strictly two-party session: two participants occupy the
//! two [`Slot`]s of a room and play up to [`SET_COUNT`] sets. Everything
//! that crosses the wire — identifiers, slots, outcomes, the final match
//! report — is defined here.

use serde::{Deserialize, Serialize};

use std::fmt;

/// Number of sets in a match. A match ends early once a slot has won
/// three of them.
pub const SET_COUNT: usize = 5;

/// Size of the game pool that the per-set content is drawn from.
pub const GAME_POOL: u8 = 8;

/// Length of generated room keys.
pub const ROOM_KEY_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable identifier for a participant, resolved from a connection's
/// credentials at handshake time.
///
/// `#[serde(transparent)]` keeps the JSON representation a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A human-shareable room key: 8 alphanumeric characters, unique among
/// all live rooms, immutable after creation.
///
/// Keys are generated by the lifecycle layer via rejection sampling
/// against the store; this type just carries the result around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Wraps an already-generated key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Slots and outcomes
// ---------------------------------------------------------------------------

/// A participant's position within a room.
///
/// The room founder always holds `First`; the joiner holds `Second`.
/// Using a closed enum (rather than an array index) means an
/// out-of-range slot is unrepresentable past the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    /// Both slots, in order.
    pub const ALL: [Slot; 2] = [Slot::First, Slot::Second];

    /// The array index this slot maps to in per-slot pairs.
    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }

    /// The opposing slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::First => write!(f, "slot-0"),
            Slot::Second => write!(f, "slot-1"),
        }
    }
}

/// The result of a set or of a whole match, from the room's perspective.
///
/// The same enum serves both levels so set results and match results can
/// never disagree about which side a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Slot `First` won.
    First,
    /// Slot `Second` won.
    Second,
    /// Drawn.
    Draw,
}

impl Outcome {
    /// The winning slot, if the outcome is decisive.
    pub fn winner(self) -> Option<Slot> {
        match self {
            Outcome::First => Some(Slot::First),
            Outcome::Second => Some(Slot::Second),
            Outcome::Draw => None,
        }
    }

    /// The outcome seen from one slot's perspective.
    pub fn score_for(self, slot: Slot) -> MatchScore {
        match self.winner() {
            None => MatchScore::Draw,
            Some(w) if w == slot => MatchScore::Win,
            Some(_) => MatchScore::Loss,
        }
    }
}

/// A resolved match from a single participant's perspective. Used as the
/// outcome tag when persisting rating changes and win/loss/draw counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScore {
    Win,
    Loss,
    Draw,
}

impl MatchScore {
    /// The Elo score value: 1 for a win, 0 for a loss, 0.5 for a draw.
    pub fn value(self) -> f64 {
        match self {
            MatchScore::Win => 1.0,
            MatchScore::Loss => 0.0,
            MatchScore::Draw => 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Result payloads
// ---------------------------------------------------------------------------

/// Public profile data for one participant, as shown at match start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub username: String,
    pub rating: f64,
}

/// One participant's rating movement in a resolved match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub participant: ParticipantId,
    pub old_rating: f64,
    pub new_rating: f64,
}

/// The final report of a resolved match: the outcome, both per-set point
/// arrays, the set tallies, and both rating movements.
///
/// Cached on the room record once produced so replays never recompute
/// (and never re-apply) the rating adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub outcome: Outcome,
    /// Whether rating adjustments had game-theoretic effect.
    pub rated: bool,
    /// Sets won per slot. Halves occur for drawn sets (e.g. 2.5).
    pub set_tally: [f64; 2],
    /// Points scored per slot, per set.
    pub points: [[i64; SET_COUNT]; 2],
    /// Rating movement per slot.
    pub ratings: [RatingChange; 2],
}

// =========================================================================
// Tests
// =========================================================================
