//! The user-directory collaborator: profile lookup and result recording.
//!
//! Credential issuance and durable profile storage live outside this
//! system. The engine consumes exactly two operations — a summary lookup
//! and a rating write — expressed here as the [`UserDirectory`] trait.

use std::collections::HashMap;

use tokio::sync::Mutex;

use matchpoint_protocol::{MatchScore, ParticipantId, ParticipantSummary};

use crate::StoreError;

/// Profile lookup and result persistence, as consumed by the match core.
pub trait UserDirectory: Send + Sync + 'static {
    /// Returns a participant's public profile (username + rating).
    fn summary(
        &self,
        participant: ParticipantId,
    ) -> impl Future<Output = Result<ParticipantSummary, StoreError>> + Send;

    /// Persists a new rating and bumps the participant's win/loss/draw
    /// counter for `outcome`. Called exactly once per participant per
    /// resolved match.
    fn record_result(
        &self,
        participant: ParticipantId,
        new_rating: f64,
        outcome: MatchScore,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A user profile as held by the in-memory directory.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub username: String,
    pub rating: f64,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl UserRecord {
    /// A fresh profile at the conventional starting rating.
    pub fn new(username: impl Into<String>, rating: f64) -> Self {
        Self {
            username: username.into(),
            rating,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }
}

/// Process-local [`UserDirectory`] backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<ParticipantId, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a profile. Test and bootstrap hook.
    pub async fn put(&self, participant: ParticipantId, record: UserRecord) {
        self.users.lock().await.insert(participant, record);
    }

    /// Snapshot of a profile, counters included.
    pub async fn get(&self, participant: ParticipantId) -> Option<UserRecord> {
        self.users.lock().await.get(&participant).cloned()
    }
}

impl UserDirectory for MemoryUserDirectory {
    async fn summary(
        &self,
        participant: ParticipantId,
    ) -> Result<ParticipantSummary, StoreError> {
        let users = self.users.lock().await;
        let record = users
            .get(&participant)
            .ok_or(StoreError::ParticipantNotFound(participant))?;
        Ok(ParticipantSummary {
            username: record.username.clone(),
            rating: record.rating,
        })
    }

    async fn record_result(
        &self,
        participant: ParticipantId,
        new_rating: f64,
        outcome: MatchScore,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let record = users
            .get_mut(&participant)
            .ok_or(StoreError::ParticipantNotFound(participant))?;
        record.rating = new_rating;
        match outcome {
            MatchScore::Win => record.wins += 1,
            MatchScore::Loss => record.losses += 1,
            MatchScore::Draw => record.draws += 1,
        }
        tracing::debug!(
            %participant,
            rating = new_rating,
            ?outcome,
            "match result recorded"
        );
        Ok(())
    }
}
