//! Sign-in, sign-up and sign-out through the runtime.

use super::harness::{
    failing_store, runtime_with, session_for, signed_in, MockProvider,
};
use crate::{
    AuthError, AuthRuntime, AuthState, Principal, ProviderResponse, Session, SessionManager, User,
};

#[tokio::test]
async fn sign_in_then_get_credential_needs_no_refresh() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "access-1", "refresh-1")));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;

    let principal = runtime.sign_in("a@x.com", "pw").await.unwrap();

    assert_eq!(principal, Principal::User(User::new("u1")));
    assert_eq!(runtime.get_credential().await, Some("access-1".to_string()));
    assert_eq!(provider.refresh_calls(), 0);
    assert_eq!(
        probe.pair(),
        Some(("access-1".to_string(), "refresh-1".to_string()))
    );
}

#[tokio::test]
async fn rejected_sign_in_surfaces_and_changes_nothing() {
    let provider = MockProvider::new();
    provider.script_sign_in(Err(AuthError::InvalidCredentials(
        "Invalid login credentials".to_string(),
    )));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;

    let err = runtime.sign_in("a@x.com", "wrong").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert!(err.is_user_facing());
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(probe.is_empty());
}

#[tokio::test]
async fn network_failure_on_sign_in_is_transient() {
    let provider = MockProvider::new();
    let (runtime, _) = runtime_with(&provider);
    runtime.start().await;

    let err = runtime.sign_in("a@x.com", "pw").await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn sign_in_without_session_is_not_adopted() {
    let provider = MockProvider::new();
    provider.script_sign_in(Ok(ProviderResponse {
        session: None,
        user: Some(User::new("u1")),
    }));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;

    let err = runtime.sign_in("a@x.com", "pw").await.unwrap_err();

    assert!(matches!(err, AuthError::SessionNotIssued));
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(probe.is_empty());
}

#[tokio::test]
async fn sign_in_uses_separately_reported_user() {
    let provider = MockProvider::new();
    provider.script_sign_in(Ok(ProviderResponse {
        session: Some(Session::new("a", "r").unwrap()),
        user: Some(User::new("u3").with_email("c@x.com")),
    }));
    let (runtime, _) = runtime_with(&provider);
    runtime.start().await;

    let principal = runtime.sign_in("c@x.com", "pw").await.unwrap();

    assert_eq!(principal.user_id(), Some("u3"));
    assert_eq!(runtime.snapshot().email.as_deref(), Some("c@x.com"));
}

#[tokio::test]
async fn sign_in_without_user_yields_token_only_principal() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(Session::new("bare-access", "r").unwrap()));
    let (runtime, _) = runtime_with(&provider);
    runtime.start().await;

    let principal = runtime.sign_in("a@x.com", "pw").await.unwrap();

    assert_eq!(
        principal,
        Principal::TokenOnly {
            access_token: "bare-access".to_string()
        }
    );
    assert!(runtime.auth_state().is_authenticated());
}

#[tokio::test]
async fn sign_out_twice_matches_sign_out_once() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "a", "r")));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;
    runtime.sign_in("a@x.com", "pw").await.unwrap();

    runtime.sign_out().await;
    let mut rx = runtime.subscribe_state();
    runtime.sign_out().await;

    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(!rx.has_changed().unwrap());
    assert!(probe.is_empty());
    assert_eq!(runtime.get_credential().await, None);
}

#[tokio::test]
async fn sign_out_clears_local_state_when_provider_is_unreachable() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "a", "r")));
    provider.fail_sign_out();
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;
    runtime.sign_in("a@x.com", "pw").await.unwrap();

    runtime.sign_out().await;

    assert_eq!(provider.sign_out_calls(), 1);
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(probe.is_empty());
}

#[tokio::test]
async fn sign_out_before_restore_settles_state() {
    let provider = MockProvider::new();
    let (runtime, _) = runtime_with(&provider);
    assert_eq!(runtime.auth_state(), AuthState::Loading);

    runtime.sign_out().await;
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);

    runtime.start().await;
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert_eq!(provider.active_session_calls(), 0);
}

#[tokio::test]
async fn sign_up_pending_confirmation_returns_created_user() {
    let provider = MockProvider::new();
    provider.script_sign_up(Ok(ProviderResponse {
        session: None,
        user: Some(User::new("u1").with_email("a@x.com")),
    }));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;

    let response = runtime.sign_up("a@x.com", "pw", None).await.unwrap();

    assert_eq!(response.user().map(|u| u.id.as_str()), Some("u1"));
    assert!(response.session.is_none());
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
    assert!(probe.is_empty());
}

#[tokio::test]
async fn sign_up_with_immediate_session_signs_in() {
    let provider = MockProvider::new();
    provider.script_sign_up(signed_in(session_for("u2", "a2", "r2")));
    let (runtime, probe) = runtime_with(&provider);
    runtime.start().await;

    let response = runtime
        .sign_up("b@x.com", "pw", Some(serde_json::json!({ "name": "Bo" })))
        .await
        .unwrap();

    assert!(response.session.is_some());
    assert_eq!(
        runtime.auth_state(),
        AuthState::Authenticated(Principal::User(User::new("u2")))
    );
    assert_eq!(probe.pair(), Some(("a2".to_string(), "r2".to_string())));
}

#[tokio::test]
async fn state_is_always_one_of_three_through_a_lifecycle() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "a", "r")));
    let (runtime, _) = runtime_with(&provider);
    let mut seen = vec![runtime.auth_state()];

    runtime.start().await;
    seen.push(runtime.auth_state());
    runtime.sign_in("a@x.com", "pw").await.unwrap();
    seen.push(runtime.auth_state());
    runtime.sign_out().await;
    seen.push(runtime.auth_state());

    assert_eq!(
        seen,
        vec![
            AuthState::Loading,
            AuthState::Unauthenticated,
            AuthState::Authenticated(Principal::User(User::new("u1"))),
            AuthState::Unauthenticated,
        ]
    );
}

#[tokio::test]
async fn store_failures_never_block_auth() {
    let provider = MockProvider::new();
    provider.script_sign_in(signed_in(session_for("u1", "a1", "r1")));
    let runtime = AuthRuntime::new(SessionManager::new(failing_store()), provider.clone());

    runtime.start().await;
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);

    runtime.sign_in("a@x.com", "pw").await.unwrap();
    assert!(runtime.auth_state().is_authenticated());
    assert_eq!(runtime.get_credential().await, Some("a1".to_string()));

    runtime.sign_out().await;
    assert_eq!(runtime.auth_state(), AuthState::Unauthenticated);
}
