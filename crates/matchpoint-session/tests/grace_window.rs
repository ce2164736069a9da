//! Grace-window timing tests.
//!
//! All tests run on a paused clock (`start_paused = true`) so the
//! 10-second window elapses instantly and deterministically.

use std::time::Duration;

use tokio::time::{self, Instant};

use matchpoint_protocol::{ParticipantId, RoomKey};
use matchpoint_session::{ConnectionSupervisor, GraceExpiry, SupervisorConfig};

const ALICE: ParticipantId = ParticipantId(1);
const BOB: ParticipantId = ParticipantId(2);

fn key(s: &str) -> RoomKey {
    RoomKey::new(s)
}

/// Lets armed timer tasks observe an `advance` before assertions.
///
/// Awaiting a short sleep parks the runtime, which is what drives the
/// paused-clock timer wheel; plain yields never reach it.
async fn settle() {
    time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_expiry_fires_after_default_grace() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    let armed_at = Instant::now();

    sup.connection_lost(ALICE, key("AAAAAAAA"));
    assert_eq!(sup.pending_count(), 1);

    // The paused clock auto-advances to the timer deadline.
    let expiry = rx.recv().await.expect("expiry should be emitted");
    assert_eq!(
        expiry,
        GraceExpiry {
            participant: ALICE,
            room_key: key("AAAAAAAA"),
        }
    );
    assert_eq!(armed_at.elapsed(), Duration::from_secs(10));
    assert_eq!(sup.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_cancels_expiry() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;

    time::advance(Duration::from_secs(5)).await;
    assert_eq!(sup.reconnected(ALICE), Some(key("AAAAAAAA")));
    assert_eq!(sup.pending_count(), 0);

    // Well past the original deadline: still no expiry.
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_expiry_finds_nothing_pending() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;

    time::advance(Duration::from_secs(10)).await;
    settle().await;

    // The timer committed first; the late reconnect resumes nothing.
    assert_eq!(sup.reconnected(ALICE), None);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_expiry_is_emitted_exactly_once() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;

    time::advance(Duration::from_secs(60)).await;
    settle().await;

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err(), "a single drop emits a single expiry");
}

#[tokio::test(start_paused = true)]
async fn test_socket_flap_rearms_the_window() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;

    // 8 seconds in, the socket flaps and drops again.
    time::advance(Duration::from_secs(8)).await;
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;
    assert_eq!(sup.pending_count(), 1);

    // The original deadline passes without an expiry.
    time::advance(Duration::from_secs(4)).await;
    settle().await;
    assert!(rx.try_recv().is_err());

    // The rearmed deadline fires.
    time::advance(Duration::from_secs(6)).await;
    settle().await;
    assert!(rx.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_participants_expire_independently() {
    let (sup, mut rx) = ConnectionSupervisor::new(SupervisorConfig {
        grace: Duration::from_secs(10),
    });
    sup.connection_lost(ALICE, key("AAAAAAAA"));
    settle().await;

    time::advance(Duration::from_secs(6)).await;
    sup.connection_lost(BOB, key("BBBBBBBB"));
    settle().await;
    assert_eq!(sup.pending_count(), 2);

    // Alice's deadline passes first.
    time::advance(Duration::from_secs(4)).await;
    settle().await;
    let expiry = rx.try_recv().expect("alice should have expired");
    assert_eq!(expiry.participant, ALICE);
    assert_eq!(sup.pending_count(), 1);

    // Bob reconnects with time to spare.
    assert_eq!(sup.reconnected(BOB), Some(key("BBBBBBBB")));
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnected_without_pending_window_is_none() {
    let (sup, _rx) = ConnectionSupervisor::new(SupervisorConfig::default());
    assert_eq!(sup.reconnected(ALICE), None);
}
