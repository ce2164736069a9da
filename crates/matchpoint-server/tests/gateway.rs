//! End-to-end tests over real websockets: handshake, room flow, and a
//! full set through the gateway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use matchpoint_protocol::{ClientEvent, ErrorKind, Outcome, ParticipantId, RoomKey, ServerEvent};
use matchpoint_server::MatchpointServerBuilder;
use matchpoint_session::{Authenticator, SessionError, SupervisorConfig};
use matchpoint_store::{MemoryRoomStore, MemoryUserDirectory, UserRecord};

// =========================================================================
// Test authenticator and helpers
// =========================================================================

/// Accepts any numeric credential as a participant id.
struct TestAuth;

impl Authenticator for TestAuth {
    async fn resolve(&self, credential: &str) -> Result<ParticipantId, SessionError> {
        let id: u64 = credential
            .parse()
            .map_err(|_| SessionError::AuthFailed("not a number".into()))?;
        Ok(ParticipantId(id))
    }
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port with users 1 and 2 enrolled at 1500.
async fn start_server() -> (String, Arc<MemoryUserDirectory>) {
    start_server_with_grace(Duration::from_secs(10)).await
}

/// Same, with a custom disconnect-grace window for timing tests.
async fn start_server_with_grace(grace: Duration) -> (String, Arc<MemoryUserDirectory>) {
    let store = Arc::new(MemoryRoomStore::new());
    let users = Arc::new(MemoryUserDirectory::new());
    users
        .put(ParticipantId(1), UserRecord::new("alice", 1500.0))
        .await;
    users
        .put(ParticipantId(2), UserRecord::new("bob", 1500.0))
        .await;

    let server = MatchpointServerBuilder::new()
        .bind("127.0.0.1:0")
        .supervisor_config(SupervisorConfig { grace })
        .build(store, Arc::clone(&users), TestAuth)
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("local addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, users)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_event(ws: &mut ClientWs, event: &ClientEvent) {
    let bytes = serde_json::to_vec(event).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

/// Receives the next data frame and decodes it as a [`ServerEvent`].
async fn recv_event(ws: &mut ClientWs) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("recv");
        match msg {
            Message::Binary(data) => return serde_json::from_slice(&data).expect("decode"),
            Message::Text(text) => {
                return serde_json::from_slice(text.as_bytes()).expect("decode")
            }
            _ => continue,
        }
    }
}

/// Sends `hello` and asserts the `welcome` reply.
async fn hello(ws: &mut ClientWs, id: u64) {
    send_event(
        ws,
        &ClientEvent::Hello {
            credential: id.to_string(),
        },
    )
    .await;
    assert_eq!(
        recv_event(ws).await,
        ServerEvent::Welcome {
            participant: ParticipantId(id),
        }
    );
}

/// Creates a room on `ws1` and joins it from `ws2`; drains the join and
/// match-start traffic on both sides. Returns the room key.
async fn seated_match(ws1: &mut ClientWs, ws2: &mut ClientWs, rated: bool) -> RoomKey {
    send_event(ws1, &ClientEvent::CreateRoom { rated }).await;
    let key = match recv_event(ws1).await {
        ServerEvent::RoomCreated { key } => key,
        other => panic!("expected room_created, got {other:?}"),
    };

    send_event(ws2, &ClientEvent::JoinRoom { key: key.clone() }).await;
    match recv_event(ws2).await {
        ServerEvent::RoomJoined { members, rated: r, .. } => {
            assert_eq!(members, vec![ParticipantId(1), ParticipantId(2)]);
            assert_eq!(r, rated);
        }
        other => panic!("expected room_joined, got {other:?}"),
    }
    assert!(matches!(
        recv_event(ws2).await,
        ServerEvent::MatchStarted { .. }
    ));

    assert_eq!(
        recv_event(ws1).await,
        ServerEvent::MemberJoined {
            participant: ParticipantId(2),
        }
    );
    assert!(matches!(
        recv_event(ws1).await,
        ServerEvent::MatchStarted { .. }
    ));

    key
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_hello_with_valid_credential_is_welcomed() {
    let (addr, _users) = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;
}

#[tokio::test]
async fn test_hello_with_bad_credential_is_rejected() {
    let (addr, _users) = start_server().await;
    let mut ws = connect(&addr).await;

    send_event(
        &mut ws,
        &ClientEvent::Hello {
            credential: "not-a-number".into(),
        },
    )
    .await;

    match recv_event(&mut ws).await {
        ServerEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::Unauthorized),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_and_join_announces_the_match() {
    let (addr, _users) = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;

    // seated_match asserts the full announcement sequence.
    let key = seated_match(&mut ws1, &mut ws2, true).await;
    assert_eq!(key.as_str().len(), 8);
}

#[tokio::test]
async fn test_join_unknown_key_reports_not_found() {
    let (addr, _users) = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    send_event(
        &mut ws,
        &ClientEvent::JoinRoom {
            key: RoomKey::new("zzzzzzzz"),
        },
    )
    .await;

    match recv_event(&mut ws).await {
        ServerEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotFound),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_set_barrier_over_the_wire() {
    let (addr, _users) = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1, &mut ws2, true).await;

    // First signaller waits.
    send_event(&mut ws1, &ClientEvent::StartSet).await;
    assert_eq!(recv_event(&mut ws1).await, ServerEvent::SetWaiting);

    // Second signaller fires the barrier; both see the broadcast.
    send_event(&mut ws2, &ClientEvent::StartSet).await;
    assert_eq!(
        recv_event(&mut ws1).await,
        ServerEvent::SetStarted { round: 0 }
    );
    assert_eq!(
        recv_event(&mut ws2).await,
        ServerEvent::SetStarted { round: 0 }
    );
}

#[tokio::test]
async fn test_full_set_resolves_and_scores() {
    let (addr, _users) = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1, &mut ws2, true).await;

    send_event(&mut ws1, &ClientEvent::StartSet).await;
    assert_eq!(recv_event(&mut ws1).await, ServerEvent::SetWaiting);
    send_event(&mut ws2, &ClientEvent::StartSet).await;
    assert!(matches!(
        recv_event(&mut ws1).await,
        ServerEvent::SetStarted { .. }
    ));
    assert!(matches!(
        recv_event(&mut ws2).await,
        ServerEvent::SetStarted { .. }
    ));

    // Player 1 scores 7, both see the progress broadcast.
    send_event(
        &mut ws1,
        &ClientEvent::Submit {
            set_index: 0,
            added_points: 7,
        },
    )
    .await;
    match recv_event(&mut ws1).await {
        ServerEvent::SubmitRecorded { points, mistakes, .. } => {
            assert_eq!(points, 7);
            assert_eq!(mistakes, 0);
        }
        other => panic!("expected submit_recorded, got {other:?}"),
    }
    assert!(matches!(
        recv_event(&mut ws2).await,
        ServerEvent::SubmitRecorded { .. }
    ));

    // Both end the set; player 1 wins it 7-0.
    send_event(&mut ws1, &ClientEvent::EndSet).await;
    assert_eq!(recv_event(&mut ws1).await, ServerEvent::SetWaiting);
    send_event(&mut ws2, &ClientEvent::EndSet).await;

    let resolved = ServerEvent::SetResolved {
        points: [7, 0],
        outcome: Outcome::First,
    };
    assert_eq!(recv_event(&mut ws1).await, resolved);
    assert_eq!(recv_event(&mut ws2).await, resolved);

    // The scoreboard reflects the resolved set.
    send_event(&mut ws1, &ClientEvent::Scoreboard).await;
    match recv_event(&mut ws1).await {
        ServerEvent::Scoreboard {
            current_round,
            points,
            set_tally,
        } => {
            assert_eq!(current_round, 1);
            assert_eq!(points[0][0], 7);
            assert_eq!(set_tally, [1.0, 0.0]);
        }
        other => panic!("expected scoreboard, got {other:?}"),
    }
}

#[tokio::test]
async fn test_leave_mid_match_forfeits_and_notifies_opponent() {
    let (addr, users) = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1, &mut ws2, true).await;

    send_event(&mut ws1, &ClientEvent::LeaveRoom).await;
    match recv_event(&mut ws1).await {
        ServerEvent::RoomLeft { .. } => {}
        other => panic!("expected room_left, got {other:?}"),
    }

    assert_eq!(
        recv_event(&mut ws2).await,
        ServerEvent::MemberLeft {
            participant: ParticipantId(1),
        }
    );
    match recv_event(&mut ws2).await {
        ServerEvent::MatchEnded { report } => {
            assert_eq!(report.outcome, Outcome::Second);
            assert_eq!(report.set_tally, [0.0, 3.0]);
        }
        other => panic!("expected match_ended, got {other:?}"),
    }

    let bob = users.get(ParticipantId(2)).await.expect("bob exists");
    assert_eq!(bob.rating, 1510.0);
    assert_eq!(bob.wins, 1);
}

#[tokio::test]
async fn test_unreclaimed_disconnect_forfeits_the_match() {
    let (addr, users) = start_server_with_grace(Duration::from_millis(200)).await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1, &mut ws2, true).await;

    // Player 1's socket dies and nobody comes back within the window.
    ws1.close(None).await.expect("close");

    assert_eq!(
        recv_event(&mut ws2).await,
        ServerEvent::MemberLeft {
            participant: ParticipantId(1),
        }
    );
    match recv_event(&mut ws2).await {
        ServerEvent::MatchEnded { report } => {
            assert_eq!(report.outcome, Outcome::Second);
            assert_eq!(report.set_tally, [0.0, 3.0]);
        }
        other => panic!("expected match_ended, got {other:?}"),
    }

    let bob = users.get(ParticipantId(2)).await.expect("bob exists");
    assert_eq!(bob.rating, 1510.0);
    assert_eq!(bob.wins, 1);
}

#[tokio::test]
async fn test_replacement_connection_survives_old_socket_drop() {
    let (addr, users) = start_server_with_grace(Duration::from_millis(200)).await;
    let mut ws1a = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1a, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1a, &mut ws2, true).await;

    // Player 1 opens a fresh connection while the old socket is still
    // up; the handshake hands it a membership snapshot.
    let mut ws1b = connect(&addr).await;
    hello(&mut ws1b, 1).await;
    match recv_event(&mut ws1b).await {
        ServerEvent::RoomJoined { members, .. } => {
            assert_eq!(members, vec![ParticipantId(1), ParticipantId(2)]);
        }
        other => panic!("expected room_joined, got {other:?}"),
    }

    // The old socket's close must not arm a window against the live
    // connection: well past the grace, the match is still running.
    ws1a.close(None).await.expect("close");
    tokio::time::sleep(Duration::from_millis(600)).await;

    send_event(&mut ws1b, &ClientEvent::Scoreboard).await;
    assert!(matches!(
        recv_event(&mut ws1b).await,
        ServerEvent::Scoreboard { current_round: 0, .. }
    ));
    send_event(&mut ws2, &ClientEvent::Scoreboard).await;
    assert!(matches!(
        recv_event(&mut ws2).await,
        ServerEvent::Scoreboard { .. }
    ));

    let bob = users.get(ParticipantId(2)).await.expect("bob exists");
    assert_eq!(bob.rating, 1500.0);
    assert_eq!(bob.wins, 0);
}

#[tokio::test]
async fn test_reconnect_within_grace_resumes_the_match() {
    let (addr, users) = start_server_with_grace(Duration::from_millis(500)).await;
    let mut ws1a = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    hello(&mut ws1a, 1).await;
    hello(&mut ws2, 2).await;
    seated_match(&mut ws1a, &mut ws2, true).await;

    // Drop, let the server observe it, then come back inside the window.
    ws1a.close(None).await.expect("close");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut ws1b = connect(&addr).await;
    hello(&mut ws1b, 1).await;
    match recv_event(&mut ws1b).await {
        ServerEvent::RoomJoined { members, .. } => {
            assert_eq!(members, vec![ParticipantId(1), ParticipantId(2)]);
        }
        other => panic!("expected room_joined, got {other:?}"),
    }

    // Past the original deadline: no forfeit happened.
    tokio::time::sleep(Duration::from_millis(700)).await;
    send_event(&mut ws2, &ClientEvent::Scoreboard).await;
    assert!(matches!(
        recv_event(&mut ws2).await,
        ServerEvent::Scoreboard { .. }
    ));

    let bob = users.get(ParticipantId(2)).await.expect("bob exists");
    assert_eq!(bob.rating, 1500.0);
}

#[tokio::test]
async fn test_operations_outside_a_room_report_not_found() {
    let (addr, _users) = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    for event in [
        ClientEvent::StartSet,
        ClientEvent::EndSet,
        ClientEvent::Scoreboard,
        ClientEvent::LeaveRoom,
    ] {
        send_event(&mut ws, &event).await;
        match recv_event(&mut ws).await {
            ServerEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotFound),
            other => panic!("expected error for {event:?}, got {other:?}"),
        }
    }
}
