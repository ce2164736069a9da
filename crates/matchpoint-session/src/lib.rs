//! Participant sessions for matchpoint.
//!
//! Two concerns live here:
//!
//! 1. **Authentication** — the [`Authenticator`] trait the gateway calls
//!    during the handshake to turn a credential into a
//!    [`ParticipantId`](matchpoint_protocol::ParticipantId).
//! 2. **Disconnect grace** — the [`ConnectionSupervisor`], which gives a
//!    dropped participant a bounded window to reconnect before their
//!    live match is forfeited.

mod auth;
mod error;
mod supervisor;

pub use auth::Authenticator;
pub use error::SessionError;
pub use supervisor::{ConnectionSupervisor, GraceExpiry, SupervisorConfig};
