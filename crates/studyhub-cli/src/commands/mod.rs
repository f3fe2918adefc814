//! CLI command implementations.

mod auth;

pub use auth::{login, logout, signup, status, token, watch};

use anyhow::{Context, Result};
use std::sync::Arc;
use studyhub_auth::{AuthRuntime, AuthState, SessionManager, SupabaseAuthClient};
use studyhub_config::Config;
use studyhub_storage::{CredentialStore, MemoryStorage};
use tracing::debug;

/// A started auth runtime and the provider client behind it.
pub struct AuthContext {
    pub runtime: AuthRuntime,
    pub client: Arc<SupabaseAuthClient>,
}

/// Build the auth runtime from configuration and restore the launch session.
pub async fn start_runtime(config: &Config, ephemeral: bool) -> Result<AuthContext> {
    let credentials = if ephemeral {
        debug!("Using in-memory credential store");
        CredentialStore::new(Box::new(MemoryStorage::new()))
    } else {
        studyhub_storage::create_credential_store(&config.keyring_service)
            .context("Failed to open the system keychain")?
    };

    let client = Arc::new(SupabaseAuthClient::new(
        &config.supabase_url,
        config.supabase_publishable_key.clone(),
        config.request_timeout(),
    )?);

    let sessions = SessionManager::new(credentials).with_refresh_leeway(config.refresh_leeway());
    let runtime = AuthRuntime::new(sessions, client.clone());
    runtime.start().await;

    Ok(AuthContext { runtime, client })
}

/// One-line description of an auth state.
fn describe_state(state: &AuthState) -> String {
    match state {
        AuthState::Loading => "loading".to_string(),
        AuthState::Unauthenticated => "not logged in".to_string(),
        AuthState::Authenticated(principal) => {
            let who = principal
                .email()
                .or_else(|| principal.user_id())
                .unwrap_or("unknown user");
            format!("logged in as {}", who)
        }
    }
}
