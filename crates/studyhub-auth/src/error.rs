//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider rejected the identifier/secret pair.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The refresh credential is expired, revoked, or unknown to the provider.
    #[error("Invalid refresh credential: {0}")]
    InvalidRefreshCredential(String),

    /// Transport failure talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// A refresh failed; the session has been dropped.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Sign-in succeeded at the provider but no session came back.
    #[error("Provider did not issue a session")]
    SessionNotIssued,

    /// Attempt to build a session from empty credentials.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Provider answered with something we could not understand.
    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] studyhub_storage::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::UnexpectedResponse(e.to_string())
        } else {
            AuthError::Network(e.to_string())
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Retrying is always the caller's decision; nothing in this crate retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }

    /// Returns true if the error belongs in front of the user (a rejected
    /// sign-in or sign-up, or a transient failure of one).
    ///
    /// Everything else surfaces only as "you have been logged out".
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials(_) | AuthError::Network(_) | AuthError::SessionNotIssued
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
