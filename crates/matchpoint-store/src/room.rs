//! The room record: one per active match.
//!
//! A room seats at most two participants. Slot identity is explicit
//! ([`Slot::First`] for the founder, [`Slot::Second`] for the joiner) and
//! never shifts when membership changes — a forfeiting participant's slot
//! is *vacated*, not spliced out, so final match data stays addressable.

use serde::{Deserialize, Serialize};

use matchpoint_protocol::{
    MatchReport, ParticipantId, RoomKey, Slot, SET_COUNT,
};

/// Per-slot mutable match state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// The participant seated in this slot. Fixed for the match.
    pub participant: ParticipantId,

    /// Points scored per set. Accumulative; no upper bound is enforced.
    pub points: [i64; SET_COUNT],

    /// Mistakes recorded in the set in progress. Reset when a set starts.
    pub mistakes: u32,

    /// Readiness flag for the start/end barriers.
    pub ready: bool,

    /// Sets won, in half-points: a set win is worth 2, a drawn set 1.
    /// Kept integral so tallies compare exactly; 6 halves wins the match.
    pub sets_won_halves: u8,

    /// True once the occupant left mid-match (forfeiture). The slot's
    /// score state is retained for the final report.
    pub vacated: bool,
}

impl SlotRecord {
    fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            points: [0; SET_COUNT],
            mistakes: 0,
            ready: false,
            sets_won_halves: 0,
            vacated: false,
        }
    }

    /// Sets won as the conventional fractional tally (0, 0.5, … 3).
    pub fn sets_won(&self) -> f64 {
        f64::from(self.sets_won_halves) / 2.0
    }
}

/// A two-participant competitive session, keyed by a unique shareable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Unique among all live rooms; immutable after creation.
    pub key: RoomKey,

    /// Whether rating adjustments apply. Fixed at creation.
    pub rated: bool,

    /// The two seats, indexed by [`Slot`]. `None` means never occupied.
    pub slots: [Option<SlotRecord>; 2],

    /// Index of the set in progress (or next to start), 0..=5.
    /// Reaching [`SET_COUNT`] means all sets have been played.
    pub current_round: u8,

    /// True once a terminal condition fired; score state is frozen.
    pub ended: bool,

    /// The 5 game indices drawn (without replacement) from the 8-game
    /// pool once both members are present. Fixes round content.
    pub selected_games: Option<[u8; SET_COUNT]>,

    /// Cached final report. Set exactly once, when the match resolves;
    /// replaying the result must not recompute ratings.
    pub final_report: Option<MatchReport>,

    /// Optimistic-concurrency version, bumped by the store on update.
    pub version: u64,
}

impl Room {
    /// Creates a room with one founding member in [`Slot::First`].
    pub fn new(key: RoomKey, founder: ParticipantId, rated: bool) -> Self {
        Self {
            key,
            rated,
            slots: [Some(SlotRecord::new(founder)), None],
            current_round: 0,
            ended: false,
            selected_games: None,
            final_report: None,
            version: 0,
        }
    }

    /// The record for a slot, if it was ever occupied.
    pub fn slot(&self, slot: Slot) -> Option<&SlotRecord> {
        self.slots[slot.index()].as_ref()
    }

    /// Mutable access to a slot's record.
    pub fn slot_mut(&mut self, slot: Slot) -> Option<&mut SlotRecord> {
        self.slots[slot.index()].as_mut()
    }

    /// The slot a participant currently occupies (vacated slots don't count).
    pub fn slot_of(&self, participant: ParticipantId) -> Option<Slot> {
        Slot::ALL.into_iter().find(|s| {
            self.slot(*s)
                .is_some_and(|r| !r.vacated && r.participant == participant)
        })
    }

    /// Current members in slot order.
    pub fn members(&self) -> Vec<ParticipantId> {
        Slot::ALL
            .into_iter()
            .filter_map(|s| self.slot(s))
            .filter(|r| !r.vacated)
            .map(|r| r.participant)
            .collect()
    }

    /// Number of seated, non-vacated participants.
    pub fn member_count(&self) -> usize {
        self.members().len()
    }

    /// True once both seats are taken.
    pub fn is_full(&self) -> bool {
        self.member_count() == 2
    }

    /// Seats a participant in the lowest free slot.
    ///
    /// Returns `None` if the room is full or the participant is already
    /// seated. Only `Slot::Second` can ever be free here, since the
    /// founder takes `Slot::First` at creation and vacated slots are
    /// never re-seated.
    pub fn seat(&mut self, participant: ParticipantId) -> Option<Slot> {
        if self.slot_of(participant).is_some() {
            return None;
        }
        for slot in Slot::ALL {
            if self.slots[slot.index()].is_none() {
                self.slots[slot.index()] = Some(SlotRecord::new(participant));
                return Some(slot);
            }
        }
        None
    }

    /// Both seats taken and both readiness flags up — the start barrier.
    pub fn both_ready(&self) -> bool {
        Slot::ALL
            .into_iter()
            .all(|s| self.slot(s).is_some_and(|r| r.ready))
    }

    /// Both seats taken and both readiness flags down — the end barrier.
    pub fn both_done(&self) -> bool {
        self.slots.iter().flatten().count() == 2
            && self.slots.iter().flatten().all(|r| !r.ready)
    }

    /// Set tallies for both slots as fractional values.
    pub fn set_tally(&self) -> [f64; 2] {
        [
            self.slot(Slot::First).map_or(0.0, SlotRecord::sets_won),
            self.slot(Slot::Second).map_or(0.0, SlotRecord::sets_won),
        ]
    }

    /// Per-set point arrays for both slots.
    pub fn point_grid(&self) -> [[i64; SET_COUNT]; 2] {
        [
            self.slot(Slot::First).map_or([0; SET_COUNT], |r| r.points),
            self.slot(Slot::Second).map_or([0; SET_COUNT], |r| r.points),
        ]
    }
}
