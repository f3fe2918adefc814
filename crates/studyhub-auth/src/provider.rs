//! Identity provider contract.

use crate::{AuthResult, ProviderEvent, ProviderResponse, Session};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Remote identity provider the session layer reconciles against.
///
/// Implementations perform the network calls; they never touch the
/// credential store or the auth state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Password sign-in.
    ///
    /// Fails with `InvalidCredentials` or `Network`.
    async fn password_sign_in(&self, identifier: &str, secret: &str)
        -> AuthResult<ProviderResponse>;

    /// Password sign-up. A response without a session is not a failure.
    async fn password_sign_up(
        &self,
        identifier: &str,
        secret: &str,
        attributes: Option<serde_json::Value>,
    ) -> AuthResult<ProviderResponse>;

    /// Exchange a refresh credential for a new session.
    ///
    /// Fails with `InvalidRefreshCredential` or `Network`.
    async fn refresh_session(&self, refresh_credential: &str) -> AuthResult<Session>;

    /// End the remote session. Callers treat failures as best-effort.
    async fn sign_out(&self) -> AuthResult<()>;

    /// The provider's live session, if it has one.
    async fn get_active_session(&self) -> AuthResult<Option<Session>>;

    /// Subscribe to provider-pushed auth events.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
