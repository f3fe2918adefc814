//! Session, principal, and auth state types.

use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Provider user ID
    pub id: String,
    /// Email, when the provider shares it
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form attributes supplied at sign-up
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// Full user identity.
    User(User),
    /// Stand-in used when the provider returned a session without a user.
    TokenOnly {
        #[serde(skip_serializing)]
        access_token: String,
    },
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::TokenOnly { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|u| u.id.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.user().and_then(|u| u.email.as_deref())
    }
}

/// An access/refresh credential pair bound to an optional user.
///
/// Both credentials are guaranteed non-empty.
#[derive(Clone, PartialEq)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
    user: Option<User>,
}

impl Session {
    /// Build a session; fails if either credential is empty.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> AuthResult<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();

        if access_token.is_empty() {
            return Err(AuthError::InvalidSession(
                "access credential is empty".to_string(),
            ));
        }
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidSession(
                "refresh credential is empty".to_string(),
            ));
        }

        Ok(Self {
            access_token,
            refresh_token,
            expires_at: None,
            user: None,
        })
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The principal this session authenticates.
    pub fn principal(&self) -> Principal {
        match &self.user {
            Some(user) => Principal::User(user.clone()),
            None => Principal::TokenOnly {
                access_token: self.access_token.clone(),
            },
        }
    }

    /// Whether the access credential expires within `leeway` from now.
    ///
    /// Sessions without a known expiry never count as expired.
    pub fn is_expired_within(&self, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let leeway = chrono::Duration::from_std(leeway).unwrap_or(chrono::Duration::zero());
                Utc::now() + leeway >= expires_at
            }
            None => false,
        }
    }

    /// Keep the user from `previous` when a refreshed session omits it.
    pub(crate) fn inherit_user(mut self, previous: Option<&Session>) -> Self {
        if self.user.is_none() {
            self.user = previous.and_then(|p| p.user.clone());
        }
        self
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Raw result of a sign-in or sign-up call.
///
/// Sign-up may create a user without a session (pending email confirmation),
/// so callers get both halves.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub session: Option<Session>,
    pub user: Option<User>,
}

impl ProviderResponse {
    /// The user from the response, falling back to the session's user.
    pub fn user(&self) -> Option<&User> {
        self.user
            .as_ref()
            .or_else(|| self.session.as_ref().and_then(Session::user))
    }
}

/// Auth change pushed by the provider, not caused by a local call.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    SignedIn(Session),
    SignedOut,
}

/// UI-facing auth state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "principal", rename_all = "snake_case")]
pub enum AuthState {
    /// Restore in progress; not the same as logged out.
    Loading,
    Unauthenticated,
    Authenticated(Principal),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }
}

/// Point-in-time status for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
