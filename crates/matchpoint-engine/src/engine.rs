//! The match engine: readiness barriers, scoring, and set/match resolution.
//!
//! Per room, each set moves through a small state machine:
//!
//! ```text
//! AWAITING_START ──(both ready)──→ IN_PROGRESS ──(both done)──→ RESOLVED
//!        ↑                                                         │
//!        └──────────────── next round (< 5 sets) ──────────────────┘
//!                                                                  │
//!                                   (a slot reaches 3, or 2.5–2.5) ▼
//!                                                           MATCH_COMPLETE
//! ```
//!
//! Both barriers are symmetric: `start_set` raises a slot's readiness and
//! fires only when both are up; `end_set` lowers it and resolves only
//! when both are down. A participant repeating either signal before the
//! partner responds has no additional effect.

use std::sync::Arc;

use rand::seq::index;

use matchpoint_protocol::{
    MatchReport, Outcome, ParticipantId, ParticipantSummary, RoomKey, Slot,
    GAME_POOL, SET_COUNT,
};
use matchpoint_store::{Room, RoomStore, UserDirectory};

use crate::{EngineError, RatingService, RoomLocks};

/// Payload for the `match-started` broadcast: the drawn game list and
/// both participants' public profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStart {
    pub games: [u8; SET_COUNT],
    pub players: [ParticipantSummary; 2],
}

/// Result of a `start_set` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStart {
    /// The partner has not signalled yet; the barrier holds.
    Waiting,
    /// Both slots ready — the set is in progress.
    Started { round: u8 },
}

/// Result of an `end_set` signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SetEnd {
    /// The partner is still playing; nothing scored yet.
    Waiting,
    /// Both slots ended: the set is scored and the round advanced.
    Resolved { points: [i64; 2], outcome: Outcome },
}

/// A recorded submission: the accumulated counters after the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRecord {
    pub slot: Slot,
    pub set_index: usize,
    pub points: i64,
    pub mistakes: u32,
}

/// Whether the match has reached a terminal condition.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchStatus {
    InProgress,
    Ended(MatchReport),
}

/// A read-only snapshot of the running score.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoreboard {
    pub current_round: u8,
    pub points: [[i64; SET_COUNT]; 2],
    pub set_tally: [f64; 2],
}

/// Drives scoring and resolution for all rooms.
///
/// Every mutating operation runs inside the room's critical section and
/// persists through the versioned store, so concurrent signals from the
/// two participants serialize instead of racing.
pub struct MatchEngine<S, U> {
    store: Arc<S>,
    locks: Arc<RoomLocks>,
    rating: RatingService<U>,
}

impl<S: RoomStore, U: UserDirectory> MatchEngine<S, U> {
    pub fn new(store: Arc<S>, locks: Arc<RoomLocks>, rating: RatingService<U>) -> Self {
        Self {
            store,
            locks,
            rating,
        }
    }

    /// Prepares the match once both members are present: draws 5 distinct
    /// games from the 8-game pool (fixed on first call) and collects both
    /// participants' profiles for the `match-started` broadcast.
    ///
    /// Returns `None` while the room still has a single member.
    pub async fn begin(&self, key: &RoomKey) -> Result<Option<MatchStart>, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self.find(key).await?;
        if !room.is_full() {
            return Ok(None);
        }

        let games = match room.selected_games {
            Some(games) => games,
            None => {
                let games = draw_games();
                room.selected_games = Some(games);
                room = self.store.update(room).await?;
                tracing::info!(room_key = %key, ?games, "games drawn for match");
                games
            }
        };

        let players = self.profiles(&room).await?;
        Ok(Some(MatchStart { games, players }))
    }

    /// Raises a slot's readiness flag. The set starts only when both
    /// slots are ready; on that transition both mistake counters reset
    /// atomically with the flags. Idempotent per participant.
    pub async fn start_set(
        &self,
        key: &RoomKey,
        participant: ParticipantId,
    ) -> Result<SetStart, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self.find(key).await?;
        if room.ended {
            return Err(EngineError::AlreadyEnded(key.clone()));
        }
        let slot = self.member_slot(&room, participant)?;

        slot_mut(&mut room, slot).ready = true;

        if room.both_ready() {
            for s in Slot::ALL {
                slot_mut(&mut room, s).mistakes = 0;
            }
            let round = room.current_round;
            self.store.update(room).await?;
            tracing::debug!(room_key = %key, round, "set started");
            Ok(SetStart::Started { round })
        } else {
            self.store.update(room).await?;
            Ok(SetStart::Waiting)
        }
    }

    /// Records a submission during a set: a non-zero `added_points`
    /// accumulates onto the slot's score for `set_index`; zero records a
    /// mistake instead. No barrier semantics.
    pub async fn submit(
        &self,
        key: &RoomKey,
        participant: ParticipantId,
        set_index: usize,
        added_points: i64,
    ) -> Result<SubmitRecord, EngineError> {
        if set_index >= SET_COUNT {
            return Err(EngineError::InvalidArgument(format!(
                "set index {set_index} out of range 0..{SET_COUNT}"
            )));
        }

        let _guard = self.locks.acquire(key).await;

        let mut room = self.find(key).await?;
        if room.ended {
            return Err(EngineError::AlreadyEnded(key.clone()));
        }
        let slot = self.member_slot(&room, participant)?;

        let rec = slot_mut(&mut room, slot);
        if added_points != 0 {
            // Saturate rather than wrap on pathological totals.
            rec.points[set_index] = rec.points[set_index].saturating_add(added_points);
        } else {
            rec.mistakes += 1;
        }
        let record = SubmitRecord {
            slot,
            set_index,
            points: rec.points[set_index],
            mistakes: rec.mistakes,
        };

        self.store.update(room).await?;
        Ok(record)
    }

    /// Lowers a slot's readiness flag. The set resolves only when both
    /// slots have ended: the higher score for the current round wins the
    /// set (+1), equal scores draw it (+0.5 each), and the round index
    /// advances. The mirror barrier of [`start_set`](Self::start_set).
    pub async fn end_set(
        &self,
        key: &RoomKey,
        participant: ParticipantId,
    ) -> Result<SetEnd, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self.find(key).await?;
        if room.ended {
            return Err(EngineError::AlreadyEnded(key.clone()));
        }
        let slot = self.member_slot(&room, participant)?;

        // All five sets played: nothing left to resolve.
        if usize::from(room.current_round) >= SET_COUNT {
            return Ok(SetEnd::Waiting);
        }

        slot_mut(&mut room, slot).ready = false;

        if !room.both_done() {
            self.store.update(room).await?;
            return Ok(SetEnd::Waiting);
        }

        let round = usize::from(room.current_round);
        let points = [
            slot_ref(&room, Slot::First).points[round],
            slot_ref(&room, Slot::Second).points[round],
        ];
        let outcome = match points[0].cmp(&points[1]) {
            std::cmp::Ordering::Greater => {
                slot_mut(&mut room, Slot::First).sets_won_halves += 2;
                Outcome::First
            }
            std::cmp::Ordering::Less => {
                slot_mut(&mut room, Slot::Second).sets_won_halves += 2;
                Outcome::Second
            }
            std::cmp::Ordering::Equal => {
                slot_mut(&mut room, Slot::First).sets_won_halves += 1;
                slot_mut(&mut room, Slot::Second).sets_won_halves += 1;
                Outcome::Draw
            }
        };
        room.current_round += 1;

        self.store.update(room).await?;
        tracing::info!(room_key = %key, round, ?outcome, "set resolved");
        Ok(SetEnd::Resolved { points, outcome })
    }

    /// Checks for match completion: a slot reaching 3 sets ends the match
    /// decisively, both at 2.5 ends it drawn. On the ending transition
    /// the ratings are settled exactly once and the report cached;
    /// calling again replays the cached report with no rating effect.
    pub async fn match_result(&self, key: &RoomKey) -> Result<MatchStatus, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self.find(key).await?;
        if let Some(report) = &room.final_report {
            return Ok(MatchStatus::Ended(report.clone()));
        }

        let halves = [
            room.slot(Slot::First).map_or(0, |r| r.sets_won_halves),
            room.slot(Slot::Second).map_or(0, |r| r.sets_won_halves),
        ];
        let outcome = if halves[0] >= 6 {
            Outcome::First
        } else if halves[1] >= 6 {
            Outcome::Second
        } else if halves == [5, 5] {
            Outcome::Draw
        } else {
            return Ok(MatchStatus::InProgress);
        };

        room.ended = true;
        let ratings = self.rating.settle(&room, outcome).await?;
        let report = MatchReport {
            outcome,
            rated: room.rated,
            set_tally: room.set_tally(),
            points: room.point_grid(),
            ratings,
        };
        room.final_report = Some(report.clone());
        self.store.update(room).await?;

        tracing::info!(room_key = %key, ?outcome, "match complete");
        Ok(MatchStatus::Ended(report))
    }

    /// Read-only snapshot of the running score.
    pub async fn scoreboard(&self, key: &RoomKey) -> Result<Scoreboard, EngineError> {
        let room = self.find(key).await?;
        Ok(Scoreboard {
            current_round: room.current_round,
            points: room.point_grid(),
            set_tally: room.set_tally(),
        })
    }

    async fn find(&self, key: &RoomKey) -> Result<Room, EngineError> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))
    }

    fn member_slot(
        &self,
        room: &Room,
        participant: ParticipantId,
    ) -> Result<Slot, EngineError> {
        room.slot_of(participant)
            .ok_or_else(|| EngineError::NotAMember(participant, room.key.clone()))
    }

    async fn profiles(&self, room: &Room) -> Result<[ParticipantSummary; 2], EngineError> {
        let first = slot_ref(room, Slot::First).participant;
        let second = slot_ref(room, Slot::Second).participant;
        Ok([
            self.rating.directory().summary(first).await?,
            self.rating.directory().summary(second).await?,
        ])
    }
}

/// Draws [`SET_COUNT`] distinct game indices from the pool, without
/// replacement.
fn draw_games() -> [u8; SET_COUNT] {
    let mut rng = rand::rng();
    let drawn = index::sample(&mut rng, usize::from(GAME_POOL), SET_COUNT);
    let mut games = [0u8; SET_COUNT];
    for (dst, idx) in games.iter_mut().zip(drawn.iter()) {
        *dst = idx as u8;
    }
    games
}

/// Occupied-slot access. The engine only resolves slots through
/// `slot_of`/`is_full`, so an absent record here is a broken invariant.
fn slot_ref(room: &Room, slot: Slot) -> &matchpoint_store::SlotRecord {
    room.slot(slot).expect("slot occupied for seated room")
}

fn slot_mut(room: &mut Room, slot: Slot) -> &mut matchpoint_store::SlotRecord {
    room.slot_mut(slot).expect("slot occupied for seated room")
}
