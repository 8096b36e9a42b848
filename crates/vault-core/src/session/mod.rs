//! Authentication, lock state and the lifetime of the vault key

mod config;
mod controller;
mod monitor;
mod state;

pub use config::{SessionConfig, DEFAULT_AUTO_LOCK_TIMEOUT, DEFAULT_NEW_VAULT_ITERATIONS};
pub use controller::{LockHook, SessionController, UnlockReport};
pub use state::{SessionState, StateChange, TransitionReason};
