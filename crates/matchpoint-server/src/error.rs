//! Unified error type for the server binary.

use matchpoint_engine::EngineError;
use matchpoint_protocol::ProtocolError;
use matchpoint_session::SessionError;

/// Top-level error wrapping the sub-crate errors.
///
/// The `#[from]` variants let `?` convert sub-crate errors on the way
/// up through the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener or socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A websocket-level failure (handshake, send, recv).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Encode/decode failure on a frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or supervision failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room/match operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
