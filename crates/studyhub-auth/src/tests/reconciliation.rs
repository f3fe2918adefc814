//! Launch restore and provider-pushed events.

use super::harness::{
    failing_store, locking_store, runtime_with, session_for, settle, signed_in, wait_for,
    MockProvider,
};
use crate::{AuthError, AuthRuntime, AuthState, Principal, ProviderEvent, SessionManager, User};

fn authenticated_as(user_id: &str) -> AuthState {
    AuthState::Authenticated(Principal::User(User::new(user_id)))
}

#[tokio::test]
async fn cold_start_refreshes_stored_credentials() {
    let provider = MockProvider::new();
    provider.script_refresh(Ok(session_for("u1", "access-new", "refresh-new")));
    let (runtime, probe) = runtime_with(&provider);
    probe.seed_pair("access-old", "refresh-old");

    assert_eq!(runtime.auth_state(), AuthState::Loading);
    runtime.start().await;

    assert_eq!(runtime.auth_state(), authenticated_as("u1"));
    assert_eq!(
        probe.pair(),
        Some(("access-new".to_string(), "refresh-new".to_string()))
    );
    assert_eq!(provider.refresh_credentials_seen(), vec!["refresh-old"]);
}

#[tokio::test]
async fn cold_start_with_rejected_credentials_ends_signed_out() {
    let provider = MockProvider::new();
    provider.script_refresh(Err(AuthError::InvalidRefreshCredential(
        "expired".to_string(),
    )));
    let (runtime, probe) = runtime_with(&provider);
    probe.seed_pair("access-old", "refresh-old");

    runtime.start().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(probe.is_empty());
    assert_eq!(runtime.get_credential().await, None);
}

#[tokio::test]
async fn live_provider_session_wins_over_store() {
    let provider = MockProvider::new();
    provider.set_active_session(Some(session_for("u5", "live-a", "live-r")));
    let (runtime, probe) = runtime_with(&provider);
    probe.seed_pair("old-a", "old-r");

    runtime.start().await;

    assert_eq!(runtime.auth_state(), authenticated_as("u5"));
    assert_eq!(probe.pair(), Some(("live-a".to_string(), "live-r".to_string())));
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test]
async fn half_stored_pair_counts_as_nothing() {
    let provider = MockProvider::new();
    let (runtime, probe) = runtime_with(&provider);
    probe.seed_refresh("orphan-refresh");

    runtime.start().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test]
async fn unreadable_store_restores_to_signed_out() {
    let provider = MockProvider::new();
    let runtime = AuthRuntime::new(SessionManager::new(failing_store()), provider.clone());

    runtime.start().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn store_locking_mid_restore_still_leaves_loading() {
    let provider = MockProvider::new();
    let (store, probe) = locking_store();
    probe.seed_pair("access-old", "refresh-old");
    let runtime = AuthRuntime::new(SessionManager::new(store), provider.clone());

    runtime.start().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test]
async fn starting_twice_restores_once() {
    let provider = MockProvider::new();
    let (runtime, _) = runtime_with(&provider);

    runtime.start().await;
    runtime.start().await;

    assert_eq!(provider.active_session_calls(), 1);
}

#[tokio::test]
async fn pushed_sign_out_ends_session() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "a", "r")));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;
    runtime.sign_in("a@x.com", "pw").await.unwrap();

    provider.push(ProviderEvent::SignedOut);
    wait_for(|| runtime.auth_state() == AuthState::Unauthenticated).await;

    assert!(probe.is_empty());
    assert_eq!(provider.sign_out_calls(), 0);
    assert_eq!(runtime.get_credential().await, None);
}

#[tokio::test]
async fn pushed_sign_in_is_adopted() {
    let provider = MockProvider::new();
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;
    let mut rx = runtime.subscribe_state();

    provider.push(ProviderEvent::SignedIn(session_for("u8", "web-a", "web-r")));
    rx.changed().await.unwrap();

    assert_eq!(*rx.borrow(), authenticated_as("u8"));
    assert_eq!(probe.pair(), Some(("web-a".to_string(), "web-r".to_string())));
    assert_eq!(runtime.get_credential().await, Some("web-a".to_string()));
}

#[tokio::test]
async fn pushed_sign_out_during_restore_is_ignored() {
    let provider = MockProvider::new();
    let gate = provider.gate_active_session();
    provider.set_active_session(Some(session_for("u1", "a", "r")));
    let (runtime, _) = runtime_with(&provider);

    let starter = runtime.clone();
    let start = tokio::spawn(async move { starter.start().await });
    wait_for(|| provider.active_session_calls() == 1).await;

    provider.push(ProviderEvent::SignedOut);
    settle().await;
    assert_eq!(runtime.auth_state(), AuthState::Loading);

    gate.add_permits(1);
    start.await.unwrap();
    settle().await;

    assert_eq!(runtime.auth_state(), authenticated_as("u1"));
}

#[tokio::test]
async fn pushed_sign_in_overtakes_pending_restore() {
    let provider = MockProvider::new();
    let gate = provider.gate_active_session();
    provider.set_active_session(Some(session_for("old", "old-a", "old-r")));
    let (runtime, probe) = runtime_with(&provider);

    let starter = runtime.clone();
    let start = tokio::spawn(async move { starter.start().await });
    wait_for(|| provider.active_session_calls() == 1).await;

    provider.push(ProviderEvent::SignedIn(session_for("new", "new-a", "new-r")));
    wait_for(|| runtime.auth_state().is_authenticated()).await;

    gate.add_permits(1);
    start.await.unwrap();

    assert_eq!(runtime.auth_state(), authenticated_as("new"));
    assert_eq!(probe.pair(), Some(("new-a".to_string(), "new-r".to_string())));
}

#[tokio::test]
async fn pushed_sign_out_after_restore_wins() {
    let provider = MockProvider::new();
    provider.set_active_session(Some(session_for("u1", "a", "r")));
    let (runtime, probe) = runtime_with(&provider);

    runtime.start().await;
    assert!(runtime.auth_state().is_authenticated());

    provider.push(ProviderEvent::SignedOut);
    wait_for(|| runtime.auth_state() == AuthState::Unauthenticated).await;
    assert!(probe.is_empty());
}

#[tokio::test]
async fn events_after_shutdown_are_not_applied() {
    let provider = MockProvider::new();
    let (runtime, _) = runtime_with(&provider);
    runtime.start().await;

    runtime.shutdown().await;
    provider.push(ProviderEvent::SignedIn(session_for("u1", "a", "r")));
    settle().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
}
