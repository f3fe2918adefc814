//! Session state machine.
//!
//! `SessionManager` owns the current session and the FSM that classifies it.
//! Every change goes through [`SessionManager::commit`], which applies the
//! FSM input, swaps the session, mirrors the credential store and publishes
//! the resulting [`AuthState`] while holding a single lock, so consumers
//! never observe a state that the store does not reflect.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState};
use crate::{AuthError, AuthResult, AuthSnapshot, AuthState, Session};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use studyhub_storage::{CredentialPair, CredentialStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default freshness margin for cached access credentials.
pub const DEFAULT_REFRESH_LEEWAY: Duration = Duration::from_secs(60);

/// Outcome of a commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Commit {
    /// The transition was applied; carries the published state.
    Applied(AuthState),
    /// The caller's view was outdated and nothing changed.
    Stale,
}

struct SessionInner {
    fsm: AuthMachine,
    session: Option<Session>,
    /// Bumped on every applied commit.
    epoch: u64,
}

/// Single owner of the in-memory session and its auth state.
pub struct SessionManager {
    credentials: CredentialStore,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<AuthState>,
    refresh_leeway: Duration,
}

impl SessionManager {
    /// Create a manager in the `Loading` state.
    pub fn new(credentials: CredentialStore) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Loading);

        Self {
            credentials,
            inner: Mutex::new(SessionInner {
                fsm: AuthMachine::new(),
                session: None,
                epoch: 0,
            }),
            state_tx,
            refresh_leeway: DEFAULT_REFRESH_LEEWAY,
        }
    }

    /// Treat access credentials expiring within `leeway` as stale.
    pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.refresh_leeway = leeway;
        self
    }

    /// Current auth state.
    pub fn current(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to auth state changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Whether a session is held.
    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    /// The cached access credential, if it is not within the refresh leeway of expiry.
    pub fn fresh_access_token(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .session
            .as_ref()
            .filter(|s| !s.is_expired_within(self.refresh_leeway))
            .map(|s| s.access_token().to_string())
    }

    /// Status snapshot for reporting.
    pub fn snapshot(&self) -> AuthSnapshot {
        let inner = self.lock();
        let state = Self::derive_state(&inner);
        let user = inner.session.as_ref().and_then(Session::user);

        AuthSnapshot {
            user_id: user.map(|u| u.id.clone()),
            email: user.and_then(|u| u.email.clone()),
            expires_at: inner.session.as_ref().and_then(Session::expires_at),
            state,
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Refresh credential to use for the next refresh: the held session's,
    /// otherwise the stored one. Store failures read as absent.
    pub(crate) fn refresh_credential(&self) -> Option<String> {
        if let Some(session) = self.lock().session.as_ref() {
            return Some(session.refresh_token().to_string());
        }

        match self.credentials.refresh_credential() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read refresh credential, treating store as empty");
                None
            }
        }
    }

    /// Stored credential pair. Store failures read as absent.
    pub(crate) fn stored_pair(&self) -> Option<CredentialPair> {
        match self.credentials.load_pair() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials, treating store as empty");
                None
            }
        }
    }

    /// Apply a transition that installs `session`.
    pub(crate) fn install(
        &self,
        input: AuthMachineInput,
        session: Session,
        expected_epoch: Option<u64>,
    ) -> AuthResult<Commit> {
        self.commit(input, Some(session), expected_epoch)
    }

    /// Apply a transition that drops the session.
    pub(crate) fn clear(
        &self,
        input: AuthMachineInput,
        expected_epoch: Option<u64>,
    ) -> AuthResult<Commit> {
        self.commit(input, None, expected_epoch)
    }

    /// Sign out on behalf of a provider event; no-op when no session is held.
    pub(crate) fn clear_if_active(&self) -> AuthResult<Commit> {
        let mut inner = self.lock();
        if inner.session.is_none() {
            debug!(state = ?inner.fsm.state(), "Sign-out event with no session, ignoring");
            return Ok(Commit::Stale);
        }
        self.apply(&mut inner, AuthMachineInput::SignOut, None)
            .map(Commit::Applied)
    }

    /// The single mutation entry point.
    ///
    /// With `expected_epoch` set, the commit only applies if no other commit
    /// happened since the caller read that epoch.
    fn commit(
        &self,
        input: AuthMachineInput,
        next: Option<Session>,
        expected_epoch: Option<u64>,
    ) -> AuthResult<Commit> {
        let mut inner = self.lock();

        if let Some(expected) = expected_epoch {
            if expected != inner.epoch {
                debug!(
                    input = ?input,
                    expected_epoch = expected,
                    current_epoch = inner.epoch,
                    "Discarding outdated auth outcome"
                );
                return Ok(Commit::Stale);
            }
        }

        self.apply(&mut inner, input, next).map(Commit::Applied)
    }

    fn apply(
        &self,
        inner: &mut SessionInner,
        input: AuthMachineInput,
        next: Option<Session>,
    ) -> AuthResult<AuthState> {
        debug_assert_eq!(input.installs_session(), next.is_some());

        let old_state = inner.fsm.state().clone();
        inner.fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;

        inner.session = next;
        inner.epoch += 1;
        self.mirror(inner.session.as_ref());

        let new_state = Self::derive_state(inner);
        if old_state != *inner.fsm.state() {
            info!(
                old_state = ?old_state,
                new_state = ?inner.fsm.state(),
                input = ?input,
                "Auth state transition"
            );
        }

        self.state_tx.send_if_modified(|current| {
            if *current == new_state {
                false
            } else {
                *current = new_state.clone();
                true
            }
        });

        Ok(new_state)
    }

    /// Best-effort write-through of the credential pair.
    fn mirror(&self, session: Option<&Session>) {
        let result = match session {
            Some(session) => self
                .credentials
                .save_pair(session.access_token(), session.refresh_token()),
            None => self.credentials.clear(),
        };

        if let Err(e) = result {
            warn!(
                error = %e,
                persisting = session.is_some(),
                "Credential store mirror failed, continuing with in-memory state"
            );
        }
    }

    fn derive_state(inner: &SessionInner) -> AuthState {
        match inner.fsm.state() {
            AuthMachineState::Loading => AuthState::Loading,
            AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
            AuthMachineState::Authenticated => inner
                .session
                .as_ref()
                .map(|s| AuthState::Authenticated(s.principal()))
                .unwrap_or(AuthState::Unauthenticated),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::harness::{failing_store, memory_store, session_for};
    use crate::{Principal, User};
    use chrono::Utc;

    #[test]
    fn test_starts_loading() {
        let (store, _) = memory_store();
        let manager = SessionManager::new(store);

        assert_eq!(manager.current(), AuthState::Loading);
        assert!(!manager.has_session());
        assert!(manager.fresh_access_token().is_none());
    }

    #[test]
    fn test_install_mirrors_store_and_publishes() {
        let (store, probe) = memory_store();
        let manager = SessionManager::new(store);
        let mut rx = manager.subscribe();

        let commit = manager
            .install(AuthMachineInput::SignIn, session_for("u1", "a1", "r1"), None)
            .unwrap();

        let expected = AuthState::Authenticated(Principal::User(User::new("u1")));
        assert_eq!(commit, Commit::Applied(expected.clone()));
        assert_eq!(manager.current(), expected);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), expected);
        assert_eq!(probe.pair(), Some(("a1".to_string(), "r1".to_string())));
    }

    #[test]
    fn test_clear_empties_store() {
        let (store, probe) = memory_store();
        let manager = SessionManager::new(store);
        manager
            .install(AuthMachineInput::SignIn, session_for("u1", "a1", "r1"), None)
            .unwrap();

        manager.clear(AuthMachineInput::SignOut, None).unwrap();

        assert_eq!(manager.current(), AuthState::Unauthenticated);
        assert!(probe.is_empty());
        assert!(manager.session().is_none());
    }

    #[test]
    fn test_stale_epoch_is_discarded() {
        let (store, probe) = memory_store();
        let manager = SessionManager::new(store);
        let epoch = manager.epoch();

        manager
            .install(AuthMachineInput::SignIn, session_for("u1", "a1", "r1"), None)
            .unwrap();

        let commit = manager
            .clear(AuthMachineInput::RefreshFailed, Some(epoch))
            .unwrap();

        assert_eq!(commit, Commit::Stale);
        assert!(manager.current().is_authenticated());
        assert!(probe.pair().is_some());
    }

    #[test]
    fn test_invalid_transition_changes_nothing() {
        let (store, probe) = memory_store();
        let manager = SessionManager::new(store);
        manager
            .install(AuthMachineInput::SignIn, session_for("u1", "a1", "r1"), None)
            .unwrap();
        let epoch = manager.epoch();

        let result = manager.clear(AuthMachineInput::NothingToRestore, None);

        assert!(matches!(result, Err(AuthError::InvalidStateTransition(_))));
        assert_eq!(manager.epoch(), epoch);
        assert!(manager.has_session());
        assert!(probe.pair().is_some());
    }

    #[test]
    fn test_clear_if_active_ignores_empty_state() {
        let (store, _) = memory_store();
        let manager = SessionManager::new(store);

        assert_eq!(manager.clear_if_active().unwrap(), Commit::Stale);
        assert_eq!(manager.current(), AuthState::Loading);
    }

    #[test]
    fn test_store_failure_is_not_fatal() {
        let manager = SessionManager::new(failing_store());

        manager
            .install(AuthMachineInput::SignIn, session_for("u1", "a1", "r1"), None)
            .unwrap();
        assert!(manager.current().is_authenticated());
        assert_eq!(manager.fresh_access_token(), Some("a1".to_string()));

        manager.clear(AuthMachineInput::SignOut, None).unwrap();
        assert_eq!(manager.current(), AuthState::Unauthenticated);
        assert!(manager.refresh_credential().is_none());
    }

    #[test]
    fn test_expiring_token_is_not_fresh() {
        let (store, _) = memory_store();
        let manager = SessionManager::new(store).with_refresh_leeway(Duration::from_secs(60));
        let session = session_for("u1", "a1", "r1")
            .with_expires_at(Utc::now() + chrono::Duration::seconds(10));

        manager
            .install(AuthMachineInput::SignIn, session, None)
            .unwrap();

        assert!(manager.fresh_access_token().is_none());
        assert_eq!(manager.refresh_credential(), Some("r1".to_string()));
    }

    #[test]
    fn test_refresh_credential_falls_back_to_store() {
        let (store, probe) = memory_store();
        probe.seed_refresh("stored-refresh");
        let manager = SessionManager::new(store);

        assert_eq!(
            manager.refresh_credential(),
            Some("stored-refresh".to_string())
        );
    }

    #[test]
    fn test_snapshot_reports_user() {
        let (store, _) = memory_store();
        let manager = SessionManager::new(store);
        manager
            .install(AuthMachineInput::SignIn, session_for("u7", "a", "r"), None)
            .unwrap();

        let snapshot = manager.snapshot();
        assert!(snapshot.state.is_authenticated());
        assert_eq!(snapshot.user_id.as_deref(), Some("u7"));
    }
}
