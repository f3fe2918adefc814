//! Authentication state machine using rust-fsm.
//!
//! The machine tracks only the state *kind*; the session it belongs to is
//! held next to it by the session manager.
//!
//! ## State Diagram
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │     Loading     │ (initial, never re-entered)
//!                  └────────┬────────┘
//!        NothingToRestore   │   Restored / Refreshed / SignIn
//!        RefreshFailed      │
//!        SignOut            │
//!          ┌────────────────┴──────────────────┐
//!          ▼                                   ▼
//! ┌─────────────────┐   SignIn / Refreshed   ┌─────────────────┐
//! │ Unauthenticated │ ─────────────────────► │  Authenticated  │ ◄─┐ SignIn
//! └─────────────────┘ ◄───────────────────── └─────────────────┘ ──┘ Refreshed
//!     ▲         │      SignOut / RefreshFailed
//!     └─────────┘ SignOut / RefreshFailed
//! ```

use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Loading)

    Loading => {
        Restored => Authenticated,
        NothingToRestore => Unauthenticated,
        SignIn => Authenticated,
        SignOut => Unauthenticated,
        Refreshed => Authenticated,
        RefreshFailed => Unauthenticated
    },
    Unauthenticated => {
        SignIn => Authenticated,
        SignOut => Unauthenticated,
        Refreshed => Authenticated,
        RefreshFailed => Unauthenticated
    },
    Authenticated => {
        SignIn => Authenticated,
        SignOut => Unauthenticated,
        Refreshed => Authenticated,
        RefreshFailed => Unauthenticated
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

impl AuthMachineInput {
    /// Whether a successful transition on this input leaves a session in place.
    pub fn installs_session(&self) -> bool {
        matches!(
            self,
            AuthMachineInput::Restored | AuthMachineInput::SignIn | AuthMachineInput::Refreshed
        )
    }
}
