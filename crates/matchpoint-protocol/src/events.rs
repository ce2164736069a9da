//! Inbound and outbound protocol events.
//!
//! Every message on the wire is one of two internally tagged enums:
//! [`ClientEvent`] (participant → server) and [`ServerEvent`]
//! (server → participant). Each operation has a closed set of result
//! variants with statically known payloads — there is no free-form
//! `{code, data}` envelope.

use serde::{Deserialize, Serialize};

use crate::{
    MatchReport, Outcome, ParticipantId, ParticipantSummary, RoomKey, Slot,
    SET_COUNT,
};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a participant can send over the persistent channel.
///
/// The first event on a fresh connection must be `Hello`; everything else
/// carries the identity resolved from that handshake implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Handshake: present a credential to resolve a participant identity.
    /// Reconnecting with the same credential within the grace window
    /// resumes the previous binding.
    Hello { credential: String },

    /// Create a room. `rated` fixes whether rating adjustments apply
    /// for the lifetime of the match.
    CreateRoom { rated: bool },

    /// Join an existing room by key.
    JoinRoom { key: RoomKey },

    /// Leave the current room (derived from the connection's binding).
    LeaveRoom,

    /// Signal readiness for the next set.
    StartSet,

    /// Signal that this participant has finished the current set.
    EndSet,

    /// Report scoring during a set. A non-zero `added_points` is a point
    /// delta for `set_index`; zero records a mistake instead.
    Submit { set_index: usize, added_points: i64 },

    /// Request the current scoreboard.
    Scoreboard,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// The kind of failure reported in a [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential could not be resolved to a participant.
    Unauthorized,
    /// No room (or participant) with that key exists.
    NotFound,
    /// The room already has two members.
    Full,
    /// Out-of-range slot or set index, or an event sent outside a room.
    InvalidArgument,
    /// The match has already ended; no further mutations are valid.
    AlreadyEnded,
    /// The durable store is unavailable; the only legitimate retry target.
    Storage,
}

/// Events the server sends back: direct replies to the initiating
/// participant and broadcasts to every connection bound to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake accepted.
    Welcome { participant: ParticipantId },

    /// Reply to `CreateRoom`.
    RoomCreated { key: RoomKey },

    /// Reply to `JoinRoom`: current membership in slot order.
    RoomJoined {
        key: RoomKey,
        members: Vec<ParticipantId>,
        rated: bool,
    },

    /// Reply to `LeaveRoom`.
    RoomLeft { key: RoomKey },

    /// Broadcast: a second participant entered the room.
    MemberJoined { participant: ParticipantId },

    /// Broadcast: a participant left (or was forfeited out of) the room.
    MemberLeft { participant: ParticipantId },

    /// Broadcast once both members are present: the drawn game list and
    /// both participants' public profiles.
    MatchStarted {
        games: Vec<u8>,
        players: [ParticipantSummary; 2],
    },

    /// Reply to `StartSet`/`EndSet` while the partner has not yet
    /// acknowledged; the barrier has not fired.
    SetWaiting,

    /// Broadcast: both slots are ready, the set is in progress.
    SetStarted { round: u8 },

    /// Broadcast: both slots have ended the set; `points` are the two
    /// slots' scores for the resolved round.
    SetResolved { points: [i64; 2], outcome: Outcome },

    /// Reply to `Submit`: the accumulated point and mistake counters.
    SubmitRecorded {
        slot: Slot,
        set_index: usize,
        points: i64,
        mistakes: u32,
    },

    /// Reply to `Scoreboard`.
    Scoreboard {
        current_round: u8,
        points: [[i64; SET_COUNT]; 2],
        set_tally: [f64; 2],
    },

    /// Broadcast: the match reached a terminal condition.
    MatchEnded { report: MatchReport },

    /// Reply to the initiating participant only; other members receive
    /// nothing for a failed operation.
    Error { kind: ErrorKind, message: String },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The event enums define the wire contract with clients; these tests
    //! pin the tagged JSON shapes so client SDKs can rely on them.

    use super::*;

    #[test]
    fn test_client_event_hello_json_format() {
        let ev = ClientEvent::Hello {
            credential: "tok".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "Hello");
        assert_eq!(json["credential"], "tok");
    }

    #[test]
    fn test_client_event_submit_round_trip() {
        let ev = ClientEvent::Submit {
            set_index: 2,
            added_points: 5,
        };
        let bytes = serde_json::to_vec(&ev).unwrap();
        let back: ClientEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn test_client_event_unit_variants_round_trip() {
        for ev in [
            ClientEvent::LeaveRoom,
            ClientEvent::StartSet,
            ClientEvent::EndSet,
            ClientEvent::Scoreboard,
        ] {
            let bytes = serde_json::to_vec(&ev).unwrap();
            let back: ClientEvent = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(ev, back);
        }
    }

    #[test]
    fn test_server_event_error_json_format() {
        let ev = ServerEvent::Error {
            kind: ErrorKind::Full,
            message: "room xYz is full".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["kind"], "full");
    }

    #[test]
    fn test_server_event_set_resolved_round_trip() {
        let ev = ServerEvent::SetResolved {
            points: [31, 18],
            outcome: Outcome::First,
        };
        let bytes = serde_json::to_vec(&ev).unwrap();
        let back: ServerEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn test_server_event_match_started_carries_profiles() {
        let ev = ServerEvent::MatchStarted {
            games: vec![3, 1, 7, 0, 5],
            players: [
                ParticipantSummary {
                    username: "ada".into(),
                    rating: 1500.0,
                },
                ParticipantSummary {
                    username: "bob".into(),
                    rating: 1480.0,
                },
            ],
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "MatchStarted");
        assert_eq!(json["games"], serde_json::json!([3, 1, 7, 0, 5]));
        assert_eq!(json["players"][0]["username"], "ada");
    }

    #[test]
    fn test_decode_unknown_event_type_returns_error() {
        let unknown = r#"{"type": "WarpDrive", "factor": 9}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
