//! Development server binary.
//!
//! Backed by the in-memory stores and a credential format of plain
//! `<id>:<username>`; any previously unseen participant is enrolled at
//! the starting rating. Real deployments supply their own stores and
//! `Authenticator`.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use matchpoint_protocol::ParticipantId;
use matchpoint_server::MatchpointServerBuilder;
use matchpoint_session::{Authenticator, SessionError};
use matchpoint_store::{MemoryRoomStore, MemoryUserDirectory, UserRecord};

const STARTING_RATING: f64 = 1500.0;

/// Accepts `<id>:<username>` credentials and auto-enrolls new users.
struct DevAuthenticator {
    users: Arc<MemoryUserDirectory>,
}

impl Authenticator for DevAuthenticator {
    async fn resolve(&self, credential: &str) -> Result<ParticipantId, SessionError> {
        let (id, username) = credential
            .split_once(':')
            .ok_or_else(|| SessionError::AuthFailed("expected <id>:<username>".into()))?;
        let id: u64 = id
            .parse()
            .map_err(|_| SessionError::AuthFailed("id must be numeric".into()))?;

        let participant = ParticipantId(id);
        if self.users.get(participant).await.is_none() {
            self.users
                .put(participant, UserRecord::new(username, STARTING_RATING))
                .await;
            tracing::info!(%participant, username, "enrolled new user");
        }
        Ok(participant)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr =
        std::env::var("MATCHPOINT_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let store = Arc::new(MemoryRoomStore::new());
    let users = Arc::new(MemoryUserDirectory::new());
    let auth = DevAuthenticator {
        users: Arc::clone(&users),
    };

    let server = MatchpointServerBuilder::new()
        .bind(&bind_addr)
        .build(store, users, auth)
        .await?;

    server.run().await?;
    Ok(())
}
