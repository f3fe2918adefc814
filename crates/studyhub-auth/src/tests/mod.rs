//! Behavioural tests for the session lifecycle.


mod lifecycle;
mod reconciliation;
