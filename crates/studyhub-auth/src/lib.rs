//! Session and credential lifecycle for StudyHub clients.
//!
//! This crate provides:
//! - An explicit FSM-based auth state (`Loading`, `Unauthenticated`, `Authenticated`)
//! - Session management mirrored to a secure credential store
//! - Single-flight credential refresh
//! - Reconciliation of launch restore with provider-pushed auth events
//! - A Supabase Auth (GoTrue) identity provider client

mod auth_fsm;
mod bridge;
mod error;
mod provider;
mod refresh;
mod runtime;
mod session;
mod supabase_client;
mod types;

#[cfg(test)]
mod tests;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState};
pub use bridge::EventBridge;
pub use error::{AuthError, AuthResult};
pub use provider::IdentityProvider;
pub use refresh::RefreshCoordinator;
pub use runtime::AuthRuntime;
pub use session::{SessionManager, DEFAULT_REFRESH_LEEWAY};
pub use supabase_client::SupabaseAuthClient;
pub use types::{AuthSnapshot, AuthState, Principal, ProviderEvent, ProviderResponse, Session, User};
