//! Event reconciliation between launch restore and provider-pushed events.
//!
//! Both sources commit through the session manager, so whichever completes
//! later wins, and a restore that was overtaken by an event is discarded.

use crate::auth_fsm::AuthMachineInput;
use crate::refresh::RefreshCoordinator;
use crate::session::{Commit, SessionManager};
use crate::{AuthState, IdentityProvider, ProviderEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Running provider-event subscription.
///
/// The subscription ends on [`EventBridge::shutdown`] or when the bridge is
/// dropped.
pub struct EventBridge {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl EventBridge {
    /// Subscribe to provider events, then restore the launch session.
    ///
    /// Returns once the restore has settled the state; events keep being
    /// applied in the background until shutdown.
    pub async fn start(
        sessions: Arc<SessionManager>,
        provider: Arc<dyn IdentityProvider>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        let events = provider.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_event_loop(sessions.clone(), events, shutdown_rx));
        restore_session(&sessions, provider.as_ref(), &refresher).await;

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Stop applying provider events and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Provider event loop ended abnormally");
            }
        }
        debug!("Provider event subscription closed");
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Restore the session at launch.
///
/// The provider's live session wins over stored credentials; stored
/// credentials are only trusted after a successful refresh. Never fails: every
/// outcome settles to a state, and an outcome overtaken by a newer commit is
/// dropped.
pub(crate) async fn restore_session(
    sessions: &SessionManager,
    provider: &dyn IdentityProvider,
    refresher: &RefreshCoordinator,
) {
    let epoch = sessions.epoch();
    if !sessions.current().is_loading() {
        debug!(epoch, "Auth state already settled, skipping restore");
        return;
    }
    debug!(epoch, "Restoring session");

    match provider.get_active_session().await {
        Ok(Some(session)) => {
            match sessions.install(AuthMachineInput::Restored, session, Some(epoch)) {
                Ok(Commit::Applied(state)) => {
                    info!(state = ?state, "Adopted live provider session");
                }
                Ok(Commit::Stale) => debug!("Live session superseded during restore"),
                Err(e) => warn!(error = %e, "Failed to adopt live provider session"),
            }
            return;
        }
        Ok(None) => debug!("Provider has no live session"),
        Err(e) => warn!(error = %e, "Failed to query live session, falling back to store"),
    }

    if sessions.stored_pair().is_some() {
        match refresher.refresh().await {
            Ok(_) => {
                info!("Restored session from stored credentials");
                return;
            }
            // A failed refresh usually settled the state already, which makes
            // the commit below stale. It does not when the store could not be
            // read a second time or the refresh task died.
            Err(e) => info!(error = %e, "Stored credentials could not be restored"),
        }
    }

    settle_unauthenticated(sessions, epoch);
}

/// Leave `Loading` for `Unauthenticated` unless a newer commit got there first.
fn settle_unauthenticated(sessions: &SessionManager, epoch: u64) {
    match sessions.clear(AuthMachineInput::NothingToRestore, Some(epoch)) {
        Ok(Commit::Applied(_)) => info!("No session to restore"),
        Ok(Commit::Stale) => debug!("State settled elsewhere during restore"),
        Err(e) => warn!(error = %e, "Failed to settle empty restore"),
    }
}

async fn run_event_loop(
    sessions: Arc<SessionManager>,
    mut events: broadcast::Receiver<ProviderEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Provider event loop started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            received = events.recv() => match received {
                Ok(event) => apply_event(&sessions, event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Provider event receiver lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Provider event channel closed");
                    break;
                }
            },
        }
    }

    debug!("Provider event loop stopped");
}

fn apply_event(sessions: &SessionManager, event: ProviderEvent) {
    let result = match event {
        ProviderEvent::SignedIn(session) => {
            info!(
                user_id = session.user().map(|u| u.id.as_str()).unwrap_or("unknown"),
                "Provider pushed sign-in"
            );
            sessions.install(AuthMachineInput::SignIn, session, None)
        }
        ProviderEvent::SignedOut => {
            info!("Provider pushed sign-out");
            sessions.clear_if_active()
        }
    };

    match result {
        Ok(Commit::Applied(AuthState::Authenticated(_))) => debug!("Provider session adopted"),
        Ok(Commit::Applied(state)) => debug!(state = ?state, "Provider event applied"),
        Ok(Commit::Stale) => {}
        Err(e) => warn!(error = %e, "Failed to apply provider event"),
    }
}
