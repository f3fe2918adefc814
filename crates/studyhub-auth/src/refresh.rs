//! Single-flight credential refresh.
//!
//! Concurrent callers that find the access credential missing or stale all
//! await one shared refresh instead of each hitting the provider. The
//! refresh runs in its own task, so it completes and commits its result even
//! if every caller stops waiting.

use crate::auth_fsm::AuthMachineInput;
use crate::session::{Commit, SessionManager};
use crate::{AuthError, AuthResult, IdentityProvider, Session};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

type RefreshOutcome = Result<Session, String>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    id: u64,
    future: SharedRefresh,
}

/// Guarantees at most one provider refresh call at a time.
pub struct RefreshCoordinator {
    sessions: Arc<SessionManager>,
    provider: Arc<dyn IdentityProvider>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(sessions: Arc<SessionManager>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            sessions,
            provider,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Refresh the session, joining the in-flight refresh if there is one.
    ///
    /// On failure the session has been dropped and the caller should treat
    /// the user as signed out; the error is always `RefreshFailed`.
    pub async fn refresh(&self) -> AuthResult<Session> {
        self.join_or_start().await.map_err(AuthError::RefreshFailed)
    }

    /// Whether a refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    fn join_or_start(&self) -> SharedRefresh {
        let mut slot = lock(&self.in_flight);

        if let Some(in_flight) = slot.as_ref() {
            debug!(refresh_id = in_flight.id, "Joining in-flight refresh");
            return in_flight.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sessions = self.sessions.clone();
        let provider = self.provider.clone();
        let in_flight = self.in_flight.clone();

        // The slot lock is held until the entry is inserted below, so the
        // task cannot clear the slot before it has been filled.
        let handle = tokio::spawn(async move {
            let outcome = run_refresh(&sessions, provider.as_ref()).await;

            let mut slot = lock(&in_flight);
            if slot.as_ref().map(|f| f.id) == Some(id) {
                *slot = None;
            }

            outcome
        });

        let future = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("refresh task failed: {}", e)),
            }
        }
        .boxed()
        .shared();

        debug!(refresh_id = id, "Starting refresh");
        *slot = Some(InFlight {
            id,
            future: future.clone(),
        });

        future
    }
}

async fn run_refresh(sessions: &SessionManager, provider: &dyn IdentityProvider) -> RefreshOutcome {
    let epoch = sessions.epoch();

    let Some(refresh_token) = sessions.refresh_credential() else {
        debug!("No refresh credential available");
        return Err("no refresh credential available".to_string());
    };

    let previous = sessions.session();

    match provider.refresh_session(&refresh_token).await {
        Ok(session) => {
            let session = session.inherit_user(previous.as_ref());

            match sessions.install(AuthMachineInput::Refreshed, session.clone(), Some(epoch)) {
                Ok(Commit::Applied(_)) => {
                    info!(
                        user_id = session.user().map(|u| u.id.as_str()).unwrap_or("unknown"),
                        "Session refreshed"
                    );
                    Ok(session)
                }
                Ok(Commit::Stale) => current_or(sessions, "session changed during refresh"),
                Err(e) => Err(e.to_string()),
            }
        }
        Err(e) => {
            warn!(error = %e, "Session refresh failed, dropping session");

            match sessions.clear(AuthMachineInput::RefreshFailed, Some(epoch)) {
                Ok(Commit::Applied(_)) => Err(e.to_string()),
                Ok(Commit::Stale) => current_or(sessions, &e.to_string()),
                Err(transition) => Err(transition.to_string()),
            }
        }
    }
}

/// Resolve an outdated refresh to whatever session is current now.
fn current_or(sessions: &SessionManager, reason: &str) -> RefreshOutcome {
    match sessions.session() {
        Some(session) => Ok(session),
        None => Err(reason.to_string()),
    }
}

fn lock(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
