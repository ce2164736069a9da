//! `MatchpointServer` builder and accept loop.
//!
//! Ties the layers together: websocket transport → protocol codec →
//! session supervision → room lifecycle and match engine.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

use matchpoint_engine::{LeaveOutcome, MatchEngine, RatingService, RoomLifecycle, RoomLocks};
use matchpoint_protocol::{JsonCodec, ServerEvent};
use matchpoint_session::{
    Authenticator, ConnectionSupervisor, GraceExpiry, SupervisorConfig,
};
use matchpoint_store::{RoomStore, UserDirectory};

use crate::gateway::handle_connection;
use crate::hub::RoomHub;
use crate::ServerError;

/// Shared server state, one per process, `Arc`-cloned into every
/// connection task.
pub(crate) struct ServerState<S, U, A> {
    pub(crate) lifecycle: RoomLifecycle<S, U>,
    pub(crate) engine: MatchEngine<S, U>,
    pub(crate) supervisor: ConnectionSupervisor,
    pub(crate) hub: RoomHub,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a matchpoint server.
pub struct MatchpointServerBuilder {
    bind_addr: String,
    supervisor_config: SupervisorConfig,
}

impl MatchpointServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            supervisor_config: SupervisorConfig::default(),
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Overrides the disconnect-grace configuration.
    pub fn supervisor_config(mut self, config: SupervisorConfig) -> Self {
        self.supervisor_config = config;
        self
    }

    /// Binds the listener and assembles the server around the given
    /// stores and authenticator.
    pub async fn build<S, U, A>(
        self,
        store: Arc<S>,
        users: Arc<U>,
        auth: A,
    ) -> Result<MatchpointServer<S, U, A>, ServerError>
    where
        S: RoomStore,
        U: UserDirectory,
        A: Authenticator,
    {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "listening");

        let locks = Arc::new(RoomLocks::new());
        let rating = RatingService::new(users);
        let (supervisor, expiry_rx) = ConnectionSupervisor::new(self.supervisor_config);

        let state = Arc::new(ServerState {
            lifecycle: RoomLifecycle::new(Arc::clone(&store), Arc::clone(&locks), rating.clone()),
            engine: MatchEngine::new(store, locks, rating),
            supervisor,
            hub: RoomHub::new(),
            auth,
            codec: JsonCodec,
        });

        Ok(MatchpointServer {
            listener,
            state,
            expiry_rx,
        })
    }
}

impl Default for MatchpointServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running matchpoint server.
pub struct MatchpointServer<S, U, A> {
    listener: TcpListener,
    state: Arc<ServerState<S, U, A>>,
    expiry_rx: UnboundedReceiver<GraceExpiry>,
}

impl<S, U, A> MatchpointServer<S, U, A>
where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    pub fn builder() -> MatchpointServerBuilder {
        MatchpointServerBuilder::new()
    }

    /// The bound local address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Also drains grace expiries: an elapsed window forfeits the
    /// participant's match exactly as a voluntary leave would.
    pub async fn run(self) -> Result<(), ServerError> {
        let MatchpointServer {
            listener,
            state,
            expiry_rx,
        } = self;

        tokio::spawn(drain_expiries(expiry_rx, Arc::clone(&state)));

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            tracing::debug!(%addr, error = %e, "websocket handshake failed");
                            continue;
                        }
                    };
                    tracing::debug!(%addr, "connection accepted");

                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(ws, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Applies grace-window expiries: the disconnected participant leaves
/// their room, forfeiting if the match was still live.
async fn drain_expiries<S, U, A>(
    mut expiry_rx: UnboundedReceiver<GraceExpiry>,
    state: Arc<ServerState<S, U, A>>,
) where
    S: RoomStore,
    U: UserDirectory,
    A: Authenticator,
{
    while let Some(GraceExpiry {
        participant,
        room_key,
    }) = expiry_rx.recv().await
    {
        tracing::info!(%participant, %room_key, "grace expired, leaving room");
        match state.lifecycle.leave(participant, &room_key).await {
            Ok(LeaveOutcome::Deleted) => state.hub.drop_room(&room_key),
            Ok(LeaveOutcome::Departed) => {
                state
                    .hub
                    .broadcast(&room_key, ServerEvent::MemberLeft { participant });
            }
            Ok(LeaveOutcome::Forfeited(report)) => {
                state
                    .hub
                    .broadcast(&room_key, ServerEvent::MemberLeft { participant });
                state
                    .hub
                    .broadcast(&room_key, ServerEvent::MatchEnded { report });
            }
            Err(e) => {
                // The room may already be gone (e.g. the opponent left
                // first and the forfeit raced the deletion).
                tracing::debug!(%participant, %room_key, error = %e, "expiry leave failed");
            }
        }
    }
}
