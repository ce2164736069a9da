//! Elo rating adjustment.
//!
//! The formula is the classic logistic expected score with a two-tier
//! K-factor: established players (rating ≥ 2000) move by at most 10 per
//! match, everyone else by at most 20. Results are rounded to two
//! decimals so stored ratings stay stable across platforms.

use std::sync::Arc;

use matchpoint_protocol::{MatchScore, Outcome, RatingChange, Slot};
use matchpoint_store::{Room, UserDirectory};

use crate::EngineError;

/// K-factor threshold: at or above this rating the smaller factor applies.
const ESTABLISHED_RATING: f64 = 2000.0;

/// Computes a participant's new rating after a match.
///
/// `score` is the outcome from that participant's perspective. When
/// `rated` is false the rating passes through unchanged (casual rooms
/// still resolve matches, they just have no game-theoretic effect).
pub fn adjust(rating: f64, opponent: f64, score: MatchScore, rated: bool) -> f64 {
    if !rated {
        return rating;
    }
    let k = if rating >= ESTABLISHED_RATING { 10.0 } else { 20.0 };
    let expected = 1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0));
    round2(rating + k * (score.value() - expected))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Applies match outcomes to the user directory.
///
/// Thin wrapper over [`UserDirectory`]: computes both new ratings from a
/// room's outcome and persists them together with win/loss/draw counters.
/// Callers own the once-per-match invariant (the engine enforces it by
/// caching the final report on the room record).
pub struct RatingService<U> {
    directory: Arc<U>,
}

impl<U> Clone for RatingService<U> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<U: UserDirectory> RatingService<U> {
    pub fn new(directory: Arc<U>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<U> {
        &self.directory
    }

    /// Settles a resolved match: computes and persists both participants'
    /// new ratings. Returns the rating changes in slot order.
    ///
    /// Both old ratings are read before either write so the two
    /// adjustments see a consistent pre-match state.
    pub async fn settle(
        &self,
        room: &Room,
        outcome: Outcome,
    ) -> Result<[RatingChange; 2], EngineError> {
        let (first, second) = match (room.slot(Slot::First), room.slot(Slot::Second)) {
            (Some(a), Some(b)) => (a.participant, b.participant),
            _ => {
                return Err(EngineError::InvalidArgument(
                    "match is not fully seated".into(),
                ));
            }
        };

        let a = self.directory.summary(first).await?;
        let b = self.directory.summary(second).await?;

        let score_a = outcome.score_for(Slot::First);
        let score_b = outcome.score_for(Slot::Second);
        let new_a = adjust(a.rating, b.rating, score_a, room.rated);
        let new_b = adjust(b.rating, a.rating, score_b, room.rated);

        self.directory.record_result(first, new_a, score_a).await?;
        self.directory.record_result(second, new_b, score_b).await?;

        tracing::info!(
            room_key = %room.key,
            ?outcome,
            rated = room.rated,
            "match settled"
        );

        Ok([
            RatingChange {
                participant: first,
                old_rating: a.rating,
                new_rating: new_a,
            },
            RatingChange {
                participant: second,
                old_rating: b.rating,
                new_rating: new_b,
            },
        ])
    }
}

// =========================================================================
// Tests
// =========================================================================
