//! The connection supervisor: disconnect-grace tracking.
//!
//! When a participant's socket drops mid-match, the match is not
//! forfeited on the spot. The supervisor arms a grace timer (10 seconds
//! by default); if the participant reconnects before it fires, play
//! resumes as if nothing happened, otherwise a [`GraceExpiry`] is
//! emitted and the server treats it exactly like a voluntary leave.
//!
//! # The reconnect/expiry race
//!
//! Both the reconnecting handshake and the firing timer converge on one
//! commit point: removing the participant's entry from the pending map,
//! under its lock. Whichever side removes the entry wins outright — the
//! timer only emits an expiry for an entry it removed itself, and a
//! reconnect only resumes a session whose entry it removed itself. A
//! participant is never both forfeited and resumed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use matchpoint_protocol::{ParticipantId, RoomKey};

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a disconnected participant has to reconnect before
    /// their match is forfeited.
    pub grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
        }
    }
}

/// Emitted when a disconnected participant's grace window elapses
/// without a reconnect. The receiver forfeits the named room on the
/// participant's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceExpiry {
    pub participant: ParticipantId,
    pub room_key: RoomKey,
}

struct Pending {
    room_key: RoomKey,
    // Distinguishes a rearmed window from the one a stale timer was
    // armed for; a timer only commits its own generation.
    generation: u64,
    timer: JoinHandle<()>,
}

/// Tracks participants whose sockets dropped while a match was live.
///
/// Cheap to clone; all clones share the pending map and the expiry
/// channel.
pub struct ConnectionSupervisor {
    pending: Arc<Mutex<HashMap<ParticipantId, Pending>>>,
    generations: Arc<AtomicU64>,
    expiry_tx: mpsc::UnboundedSender<GraceExpiry>,
    grace: Duration,
}

impl Clone for ConnectionSupervisor {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            generations: Arc::clone(&self.generations),
            expiry_tx: self.expiry_tx.clone(),
            grace: self.grace,
        }
    }
}

impl ConnectionSupervisor {
    /// Creates a supervisor and the channel its expiry events arrive on.
    pub fn new(config: SupervisorConfig) -> (Self, mpsc::UnboundedReceiver<GraceExpiry>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Arc::new(Mutex::new(HashMap::new())),
                generations: Arc::new(AtomicU64::new(0)),
                expiry_tx,
                grace: config.grace,
            },
            expiry_rx,
        )
    }

    /// Arms the grace timer for a participant whose socket just dropped
    /// while they were a member of `room_key`.
    ///
    /// A second drop for the same participant (socket flapping) rearms
    /// the timer from scratch.
    pub fn connection_lost(&self, participant: ParticipantId, room_key: RoomKey) {
        let mut pending = self.pending.lock().expect("pending map poisoned");

        if let Some(old) = pending.remove(&participant) {
            old.timer.abort();
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let map = Arc::clone(&self.pending);
        let tx = self.expiry_tx.clone();
        let grace = self.grace;
        let key = room_key.clone();
        // The timer cannot beat the insert below: it contends on the
        // pending lock, which this call still holds. The generation
        // check covers the other direction, a stale timer that outlived
        // an abort must not commit a rearmed entry.
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let committed = {
                let mut pending = map.lock().expect("pending map poisoned");
                match pending.get(&participant) {
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&participant);
                        true
                    }
                    _ => false,
                }
            };
            if committed {
                tracing::info!(%participant, room_key = %key, "grace window elapsed");
                if tx.send(GraceExpiry {
                    participant,
                    room_key: key,
                }).is_err() {
                    tracing::warn!(%participant, "expiry receiver gone, forfeit dropped");
                }
            }
        });

        pending.insert(
            participant,
            Pending {
                room_key,
                generation,
                timer,
            },
        );
        tracing::info!(%participant, grace_secs = grace.as_secs(), "grace window armed");
    }

    /// Attempts to resume a participant's pending departure.
    ///
    /// Returns the room they were about to forfeit if they made it back
    /// within the grace window, or `None` if nothing was pending (never
    /// disconnected, or the window already elapsed and the forfeit went
    /// through).
    pub fn reconnected(&self, participant: ParticipantId) -> Option<RoomKey> {
        let removed = {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            pending.remove(&participant)
        };
        removed.map(|p| {
            p.timer.abort();
            tracing::info!(%participant, room_key = %p.room_key, "reconnected within grace");
            p.room_key
        })
    }

    /// Number of participants currently inside a grace window.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending map poisoned").len()
    }
}
