//! Authentication hook for resolving participant identity.
//!
//! Matchpoint does not implement credential validation itself. The
//! gateway calls [`Authenticator::resolve`] during the handshake with
//! whatever credential the client presented (a JWT, an API key, a dev
//! username) and trusts the returned [`ParticipantId`] from then on.
//! Production deployments implement this against their identity
//! provider; tests use a table-backed stand-in.

use matchpoint_protocol::ParticipantId;

use crate::SessionError;

/// Resolves a client credential to a participant identity.
///
/// `Send + Sync + 'static` because the gateway shares one authenticator
/// across all connection tasks for the lifetime of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `credential` and returns who it belongs to.
    ///
    /// Returns [`SessionError::AuthFailed`] when the credential is
    /// invalid or expired.
    fn resolve(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<ParticipantId, SessionError>> + Send;
}
