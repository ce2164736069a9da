//! Room lifecycle: creation, membership, and the forfeiture path.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;

use matchpoint_protocol::{
    MatchReport, Outcome, ParticipantId, RoomKey, Slot, ROOM_KEY_LEN,
};
use matchpoint_store::{Room, RoomStore, UserDirectory};

use crate::{EngineError, RatingService, RoomLocks};

/// The result of leaving a room.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The leaver was the last member; the room is gone.
    Deleted,
    /// The leaver abandoned a live two-member match. The remaining
    /// participant is credited a 3–0 win; both ratings were adjusted.
    Forfeited(MatchReport),
    /// The leaver departed a room whose match had already ended; no
    /// rating effect, membership just shrank.
    Departed,
}

/// Creates rooms with unique keys and manages membership.
///
/// The `leave` path here is the *sole* forfeiture mechanism — it serves
/// both the explicit leave event and the connection supervisor's
/// grace-timeout expiry.
pub struct RoomLifecycle<S, U> {
    store: Arc<S>,
    locks: Arc<RoomLocks>,
    rating: RatingService<U>,
}

impl<S: RoomStore, U: UserDirectory> RoomLifecycle<S, U> {
    pub fn new(store: Arc<S>, locks: Arc<RoomLocks>, rating: RatingService<U>) -> Self {
        Self {
            store,
            locks,
            rating,
        }
    }

    /// Creates a room with one founding member and returns its key.
    ///
    /// Keys are rejection-sampled against the store until unused; an
    /// insert race on the same key simply resamples.
    pub async fn create(
        &self,
        owner: ParticipantId,
        rated: bool,
    ) -> Result<RoomKey, EngineError> {
        loop {
            let key = generate_key();
            if self.store.find(&key).await?.is_some() {
                continue;
            }
            match self.store.insert(Room::new(key.clone(), owner, rated)).await {
                Ok(()) => {
                    tracing::info!(room_key = %key, %owner, rated, "room created");
                    return Ok(key);
                }
                Err(matchpoint_store::StoreError::KeyTaken(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Adds a participant to an existing room.
    ///
    /// Returns the updated room so the gateway can report membership.
    pub async fn join(
        &self,
        participant: ParticipantId,
        key: &RoomKey,
    ) -> Result<Room, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self
            .store
            .find(key)
            .await?
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;

        if room.ended {
            return Err(EngineError::AlreadyEnded(key.clone()));
        }
        if room.is_full() {
            return Err(EngineError::RoomFull(key.clone()));
        }
        if room.slot_of(participant).is_some() {
            return Err(EngineError::InvalidArgument(format!(
                "participant {participant} is already a member of {key}"
            )));
        }

        let slot = room
            .seat(participant)
            .ok_or_else(|| EngineError::RoomFull(key.clone()))?;
        let room = self.store.update(room).await?;

        tracing::info!(room_key = %key, %participant, %slot, "member joined");
        Ok(room)
    }

    /// Removes a participant from a room.
    ///
    /// - Sole member: the room is deleted.
    /// - Live two-member match: the match is forfeited — the remaining
    ///   participant is credited a full-match win (3 sets to 0), both
    ///   ratings are settled, and the room stays in place (flagged
    ///   ended) so the final result can still be read.
    /// - Already-ended match: plain departure, no rating effect.
    pub async fn leave(
        &self,
        participant: ParticipantId,
        key: &RoomKey,
    ) -> Result<LeaveOutcome, EngineError> {
        let _guard = self.locks.acquire(key).await;

        let mut room = self
            .store
            .find(key)
            .await?
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;

        let slot = room
            .slot_of(participant)
            .ok_or_else(|| EngineError::NotAMember(participant, key.clone()))?;

        if room.member_count() == 1 {
            self.store.delete(key).await?;
            self.locks.discard(key).await;
            tracing::info!(room_key = %key, %participant, "last member left, room deleted");
            return Ok(LeaveOutcome::Deleted);
        }

        if room.ended {
            if let Some(rec) = room.slot_mut(slot) {
                rec.vacated = true;
            }
            self.store.update(room).await?;
            tracing::info!(room_key = %key, %participant, "member departed ended match");
            return Ok(LeaveOutcome::Departed);
        }

        // Forfeiture: the remaining slot takes the match 3–0.
        let remaining = slot.other();
        room.ended = true;
        if let Some(rec) = room.slot_mut(remaining) {
            rec.sets_won_halves = 6;
        }
        if let Some(rec) = room.slot_mut(slot) {
            rec.sets_won_halves = 0;
            rec.ready = false;
        }

        let outcome = match remaining {
            Slot::First => Outcome::First,
            Slot::Second => Outcome::Second,
        };
        let ratings = self.rating.settle(&room, outcome).await?;
        let report = MatchReport {
            outcome,
            rated: room.rated,
            set_tally: room.set_tally(),
            points: room.point_grid(),
            ratings,
        };

        if let Some(rec) = room.slot_mut(slot) {
            rec.vacated = true;
        }
        room.final_report = Some(report.clone());
        self.store.update(room).await?;

        tracing::info!(
            room_key = %key,
            %participant,
            winner = %remaining,
            "match forfeited by departure"
        );
        Ok(LeaveOutcome::Forfeited(report))
    }

    /// The room a participant is currently a member of, if any.
    pub async fn room_of(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<Room>, EngineError> {
        Ok(self.store.find_by_member(participant).await?)
    }
}

/// Generates an 8-character alphanumeric room key.
fn generate_key() -> RoomKey {
    let mut rng = rand::rng();
    let key: String = (0..ROOM_KEY_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    RoomKey::new(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_has_fixed_length_alphanumeric() {
        for _ in 0..100 {
            let key = generate_key();
            assert_eq!(key.as_str().len(), ROOM_KEY_LEN);
            assert!(key.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
