//! Per-connection handler: handshake, event routing, and disconnect.
//!
//! Each accepted websocket gets its own task running [`handle_connection`].
//! The flow is:
//!   1. Receive `Hello { credential }` → authenticate → send `Welcome`
//!   2. Rebind any existing room membership, cancelling a pending grace
//!      window; the newest connection supersedes older sockets
//!   3. Loop: decode [`ClientEvent`]s → dispatch to lifecycle/engine →
//!      reply and broadcast [`ServerEvent`]s through the hub
//!   4. On socket loss, arm the disconnect-grace timer if a match is live
//!
//! A failed operation answers the initiating connection with
//! `ServerEvent::Error` and leaves the other member untouched; only
//! socket-level failures end the handler.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use matchpoint_engine::{EngineError, LeaveOutcome, MatchStatus, SetEnd, SetStart};
use matchpoint_protocol::{
    ClientEvent, Codec, ErrorKind, JsonCodec, ParticipantId, ProtocolError, RoomKey,
    ServerEvent,
};
use matchpoint_session::Authenticator;
use matchpoint_store::{Room, RoomStore, UserDirectory};

use crate::server::ServerState;
use crate::ServerError;

/// How long a fresh connection has to present its `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, U, A>(
    ws: WsStream,
    state: Arc<ServerState<S, U, A>>,
) -> Result<(), ServerError>
where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    let (sink, mut stream) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(writer_loop(sink, rx, state.codec));

    let participant = match perform_handshake(&mut stream, &tx, &state).await {
        Ok(participant) => participant,
        Err(e) => {
            drop(tx);
            let _ = writer.await;
            return Err(e);
        }
    };

    while let Some(msg) = stream.next().await {
        let data = match msg {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.into(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // ping/pong/frame
            Err(e) => {
                tracing::debug!(%participant, error = %e, "recv error");
                break;
            }
        };

        match state.codec.decode::<ClientEvent>(&data) {
            Ok(event) => dispatch(&state, participant, &tx, event).await,
            Err(e) => {
                tracing::debug!(%participant, error = %e, "undecodable event");
                send(
                    &tx,
                    error_event(ErrorKind::InvalidArgument, format!("bad event: {e}")),
                );
            }
        }
    }

    handle_disconnect(&state, participant, &tx).await;

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Drains the outbound channel onto the socket.
async fn writer_loop(
    mut sink: WsSink,
    mut rx: UnboundedReceiver<ServerEvent>,
    codec: JsonCodec,
) {
    while let Some(event) = rx.recv().await {
        let bytes = match codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound event");
                continue;
            }
        };
        if sink.send(Message::Binary(bytes.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Receives `Hello`, authenticates, sends `Welcome`, and rebinds any
/// existing room membership to this connection.
async fn perform_handshake<S, U, A>(
    stream: &mut SplitStream<WsStream>,
    tx: &UnboundedSender<ServerEvent>,
    state: &Arc<ServerState<S, U, A>>,
) -> Result<ParticipantId, ServerError>
where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    let msg = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next())
        .await
        .map_err(|_| ProtocolError::InvalidMessage("handshake timed out".into()))?;

    let data = match msg {
        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
        Some(Ok(Message::Binary(data))) => data.into(),
        _ => {
            return Err(
                ProtocolError::InvalidMessage("connection closed before hello".into()).into(),
            );
        }
    };

    let credential = match state.codec.decode::<ClientEvent>(&data)? {
        ClientEvent::Hello { credential } => credential,
        other => {
            send(
                tx,
                error_event(ErrorKind::Unauthorized, "first event must be hello".into()),
            );
            return Err(ProtocolError::InvalidMessage(format!(
                "expected hello, got {other:?}"
            ))
            .into());
        }
    };

    let participant = match state.auth.resolve(&credential).await {
        Ok(participant) => participant,
        Err(e) => {
            send(tx, error_event(ErrorKind::Unauthorized, e.to_string()));
            return Err(e.into());
        }
    };

    send(tx, ServerEvent::Welcome { participant });
    tracing::info!(%participant, "participant authenticated");

    // Cancel any pending grace window, then rebind membership
    // unconditionally: a replacement socket can arrive before the old
    // one's drop is observed, so there may be no window to resume yet.
    // The newest authenticated connection always owns the participant.
    let resumed = state.supervisor.reconnected(participant).is_some();
    if let Ok(Some(room)) = state.lifecycle.room_of(participant).await {
        state.hub.register(&room.key, participant, tx.clone());
        send(
            tx,
            ServerEvent::RoomJoined {
                key: room.key.clone(),
                members: room.members(),
                rated: room.rated,
            },
        );
        if resumed {
            tracing::info!(%participant, room_key = %room.key, "resumed within grace");
        }
    }

    Ok(participant)
}

/// Routes one decoded client event.
async fn dispatch<S, U, A>(
    state: &Arc<ServerState<S, U, A>>,
    participant: ParticipantId,
    tx: &UnboundedSender<ServerEvent>,
    event: ClientEvent,
) where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    match event {
        ClientEvent::Hello { .. } => {
            send(
                tx,
                error_event(ErrorKind::InvalidArgument, "already authenticated".into()),
            );
        }

        ClientEvent::CreateRoom { rated } => {
            match state.lifecycle.create(participant, rated).await {
                Ok(key) => {
                    state.hub.register(&key, participant, tx.clone());
                    send(tx, ServerEvent::RoomCreated { key });
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::JoinRoom { key } => {
            match state.lifecycle.join(participant, &key).await {
                Ok(room) => {
                    state.hub.register(&key, participant, tx.clone());
                    state.hub.broadcast_except(
                        &key,
                        participant,
                        ServerEvent::MemberJoined { participant },
                    );
                    send(
                        tx,
                        ServerEvent::RoomJoined {
                            key: key.clone(),
                            members: room.members(),
                            rated: room.rated,
                        },
                    );
                    announce_match(state, &key, tx).await;
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::LeaveRoom => {
            let Some(key) = room_key_of(state, participant, tx).await else {
                return;
            };
            match state.lifecycle.leave(participant, &key).await {
                Ok(outcome) => {
                    state.hub.unregister(&key, participant);
                    match outcome {
                        LeaveOutcome::Deleted => state.hub.drop_room(&key),
                        LeaveOutcome::Departed => {
                            state
                                .hub
                                .broadcast(&key, ServerEvent::MemberLeft { participant });
                        }
                        LeaveOutcome::Forfeited(report) => {
                            state
                                .hub
                                .broadcast(&key, ServerEvent::MemberLeft { participant });
                            state
                                .hub
                                .broadcast(&key, ServerEvent::MatchEnded { report });
                        }
                    }
                    send(tx, ServerEvent::RoomLeft { key });
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::StartSet => {
            let Some(key) = room_key_of(state, participant, tx).await else {
                return;
            };
            match state.engine.start_set(&key, participant).await {
                Ok(SetStart::Waiting) => send(tx, ServerEvent::SetWaiting),
                Ok(SetStart::Started { round }) => {
                    state.hub.broadcast(&key, ServerEvent::SetStarted { round });
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::EndSet => {
            let Some(key) = room_key_of(state, participant, tx).await else {
                return;
            };
            match state.engine.end_set(&key, participant).await {
                Ok(SetEnd::Waiting) => send(tx, ServerEvent::SetWaiting),
                Ok(SetEnd::Resolved { points, outcome }) => {
                    state
                        .hub
                        .broadcast(&key, ServerEvent::SetResolved { points, outcome });
                    match state.engine.match_result(&key).await {
                        Ok(MatchStatus::Ended(report)) => {
                            state
                                .hub
                                .broadcast(&key, ServerEvent::MatchEnded { report });
                        }
                        Ok(MatchStatus::InProgress) => {}
                        Err(e) => send(tx, engine_error_event(&e)),
                    }
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::Submit {
            set_index,
            added_points,
        } => {
            let Some(key) = room_key_of(state, participant, tx).await else {
                return;
            };
            match state
                .engine
                .submit(&key, participant, set_index, added_points)
                .await
            {
                Ok(record) => {
                    // Both members see live progress, the partner's
                    // client mirrors it on the opposing lane.
                    state.hub.broadcast(
                        &key,
                        ServerEvent::SubmitRecorded {
                            slot: record.slot,
                            set_index: record.set_index,
                            points: record.points,
                            mistakes: record.mistakes,
                        },
                    );
                }
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }

        ClientEvent::Scoreboard => {
            let Some(key) = room_key_of(state, participant, tx).await else {
                return;
            };
            match state.engine.scoreboard(&key).await {
                Ok(board) => send(
                    tx,
                    ServerEvent::Scoreboard {
                        current_round: board.current_round,
                        points: board.points,
                        set_tally: board.set_tally,
                    },
                ),
                Err(e) => send(tx, engine_error_event(&e)),
            }
        }
    }
}

/// Broadcasts `MatchStarted` once the room is full.
async fn announce_match<S, U, A>(
    state: &Arc<ServerState<S, U, A>>,
    key: &RoomKey,
    tx: &UnboundedSender<ServerEvent>,
) where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    match state.engine.begin(key).await {
        Ok(Some(start)) => {
            state.hub.broadcast(
                key,
                ServerEvent::MatchStarted {
                    games: start.games.to_vec(),
                    players: start.players,
                },
            );
        }
        Ok(None) => {}
        Err(e) => send(tx, engine_error_event(&e)),
    }
}

/// Socket gone: arm the grace timer if the participant was mid-match.
///
/// A replacement connection may already have re-registered this
/// participant in the hub; in that case the closing socket is stale and
/// must not unregister it or arm a window against the live connection.
async fn handle_disconnect<S, U, A>(
    state: &Arc<ServerState<S, U, A>>,
    participant: ParticipantId,
    tx: &UnboundedSender<ServerEvent>,
) where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    match state.lifecycle.room_of(participant).await {
        Ok(Some(Room { key, ended, .. })) => {
            if !state.hub.holds(&key, participant, tx) {
                tracing::debug!(%participant, room_key = %key, "stale socket closed");
                return;
            }
            state.hub.unregister(&key, participant);
            if ended {
                tracing::info!(%participant, room_key = %key, "disconnected after match end");
            } else {
                state.supervisor.connection_lost(participant, key);
            }
        }
        Ok(None) => {
            tracing::debug!(%participant, "disconnected outside any room");
        }
        Err(e) => {
            tracing::warn!(%participant, error = %e, "room lookup failed on disconnect");
        }
    }
}

/// Resolves the room the participant is bound to, or reports `NotFound`.
async fn room_key_of<S, U, A>(
    state: &Arc<ServerState<S, U, A>>,
    participant: ParticipantId,
    tx: &UnboundedSender<ServerEvent>,
) -> Option<RoomKey>
where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    match state.lifecycle.room_of(participant).await {
        Ok(Some(room)) => Some(room.key),
        Ok(None) => {
            send(
                tx,
                error_event(ErrorKind::NotFound, "not a member of any room".into()),
            );
            None
        }
        Err(e) => {
            send(tx, engine_error_event(&e));
            None
        }
    }
}

fn send(tx: &UnboundedSender<ServerEvent>, event: ServerEvent) {
    // A dead writer means the socket is going away; the read loop will
    // notice on its own.
    let _ = tx.send(event);
}

fn error_event(kind: ErrorKind, message: String) -> ServerEvent {
    ServerEvent::Error { kind, message }
}

fn engine_error_event(err: &EngineError) -> ServerEvent {
    let kind = match err {
        EngineError::RoomNotFound(_) => ErrorKind::NotFound,
        EngineError::RoomFull(_) => ErrorKind::Full,
        EngineError::NotAMember(..) => ErrorKind::Unauthorized,
        EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        EngineError::AlreadyEnded(_) => ErrorKind::AlreadyEnded,
        EngineError::Store(_) => ErrorKind::Storage,
    };
    ServerEvent::Error {
        kind,
        message: err.to_string(),
    }
}
