//! Matchpoint's websocket gateway.
//!
//! Exposes the two-player match service over a JSON websocket protocol:
//! a client authenticates with `hello`, then creates or joins a room by
//! key and plays a best-of-five match. Room state and match resolution
//! live in `matchpoint-engine`; this crate only owns the sockets, the
//! event fan-out, and the disconnect-grace wiring.

mod error;
mod gateway;
mod hub;
mod server;

pub use error::ServerError;
pub use hub::RoomHub;
pub use server::{MatchpointServer, MatchpointServerBuilder};
