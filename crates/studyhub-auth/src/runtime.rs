//! Session runtime.
//!
//! `AuthRuntime` is the one handle UI and data-fetch code holds: it owns the
//! session manager, the refresh coordinator and the provider subscription,
//! and is the only approved way to obtain a bearer credential.

use crate::auth_fsm::AuthMachineInput;
use crate::bridge::EventBridge;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionManager;
use crate::{
    AuthError, AuthResult, AuthSnapshot, AuthState, IdentityProvider, Principal, ProviderResponse,
    Session,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

struct RuntimeInner {
    sessions: Arc<SessionManager>,
    provider: Arc<dyn IdentityProvider>,
    refresher: Arc<RefreshCoordinator>,
    bridge: Mutex<Option<EventBridge>>,
    started: AtomicBool,
}

/// Shared auth runtime.
#[derive(Clone)]
pub struct AuthRuntime {
    inner: Arc<RuntimeInner>,
}

impl AuthRuntime {
    /// Create a runtime; the state stays `Loading` until [`AuthRuntime::start`].
    pub fn new(session_manager: SessionManager, provider: Arc<dyn IdentityProvider>) -> Self {
        let sessions = Arc::new(session_manager);
        let refresher = Arc::new(RefreshCoordinator::new(sessions.clone(), provider.clone()));

        Self {
            inner: Arc::new(RuntimeInner {
                sessions,
                provider,
                refresher,
                bridge: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to provider events and restore the launch session.
    ///
    /// Returns once the state has left `Loading`, unless a sign-in overtook the
    /// restore. Calling it again is a no-op.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("Auth runtime already started");
            return;
        }

        let bridge = EventBridge::start(
            self.inner.sessions.clone(),
            self.inner.provider.clone(),
            self.inner.refresher.clone(),
        )
        .await;

        *self.bridge() = Some(bridge);
        info!(state = ?self.auth_state(), "Auth runtime started");
    }

    /// Sign in with an identifier/secret pair.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> AuthResult<Principal> {
        let response = self
            .inner
            .provider
            .password_sign_in(identifier, secret)
            .await?;

        let Some(session) = response.session else {
            warn!("Provider accepted sign-in but issued no session");
            return Err(AuthError::SessionNotIssued);
        };

        let session = attach_user(session, response.user);
        let principal = session.principal();
        self.inner
            .sessions
            .install(AuthMachineInput::SignIn, session, None)?;

        info!(user_id = principal.user_id().unwrap_or("unknown"), "Signed in");
        Ok(principal)
    }

    /// Create an account.
    ///
    /// Returns the raw provider response because the account may exist
    /// without a session (pending confirmation). A session, when present, is
    /// adopted as with [`AuthRuntime::sign_in`].
    pub async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        attributes: Option<serde_json::Value>,
    ) -> AuthResult<ProviderResponse> {
        let response = self
            .inner
            .provider
            .password_sign_up(identifier, secret, attributes)
            .await?;

        match &response.session {
            Some(session) => {
                let session = attach_user(session.clone(), response.user.clone());
                self.inner
                    .sessions
                    .install(AuthMachineInput::SignIn, session, None)?;
                info!(
                    user_id = response.user().map(|u| u.id.as_str()).unwrap_or("unknown"),
                    "Signed up with immediate session"
                );
            }
            None => info!(
                user_id = response.user().map(|u| u.id.as_str()).unwrap_or("unknown"),
                "Signed up, no session issued"
            ),
        }

        Ok(response)
    }

    /// Sign out locally, then tell the provider.
    ///
    /// Local state is always cleared; a failed remote sign-out is only logged.
    pub async fn sign_out(&self) {
        if let Err(e) = self
            .inner
            .sessions
            .clear(AuthMachineInput::SignOut, None)
        {
            warn!(error = %e, "Failed to clear local session");
        }

        if let Err(e) = self.inner.provider.sign_out().await {
            warn!(error = %e, "Remote sign-out failed, local session already cleared");
        }

        info!("Signed out");
    }

    /// A valid access credential for outbound requests.
    ///
    /// Returns the cached credential when fresh, otherwise refreshes. `None`
    /// means the caller should treat the user as signed out.
    pub async fn get_credential(&self) -> Option<String> {
        if let Some(token) = self.inner.sessions.fresh_access_token() {
            return Some(token);
        }

        match self.inner.refresher.refresh().await {
            Ok(session) => Some(session.access_token().to_string()),
            Err(e) => {
                debug!(error = %e, "No credential available");
                None
            }
        }
    }

    /// Current auth state.
    pub fn auth_state(&self) -> AuthState {
        self.inner.sessions.current()
    }

    /// Subscribe to auth state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.inner.sessions.subscribe()
    }

    /// Status snapshot for reporting.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.sessions.snapshot()
    }

    /// Whether a credential refresh is running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresher.is_refreshing()
    }

    /// Stop the provider subscription. The auth state is left as is.
    pub async fn shutdown(&self) {
        let bridge = self.bridge().take();

        if let Some(bridge) = bridge {
            bridge.shutdown().await;
            info!("Auth runtime stopped");
        }
    }

    fn bridge(&self) -> std::sync::MutexGuard<'_, Option<EventBridge>> {
        self.inner
            .bridge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Attach a separately reported user to a session that lacks one.
fn attach_user(session: Session, user: Option<crate::User>) -> Session {
    match (session.user(), user) {
        (None, Some(user)) => session.with_user(user),
        _ => session,
    }
}
