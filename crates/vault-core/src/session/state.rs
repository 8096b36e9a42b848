//! Session states and transition notifications

use serde::Serialize;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No server token
    Anonymous,
    /// Credentials sent, waiting for the server
    Authenticating,
    /// Token held, vault key not derived
    Locked,
    /// Vault key and decrypted entries in memory
    Unlocked,
    /// Token expired and could not be refreshed
    Expired,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticating => "authenticating",
            SessionState::Locked => "locked",
            SessionState::Unlocked => "unlocked",
            SessionState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Why a transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    SignInStarted,
    SignedIn,
    /// The server rejected the credentials or the token
    ServerRejected,
    /// The server could not be reached
    ServerUnreachable,
    Unlocked,
    VaultCreated,
    /// The user locked the vault
    UserLocked,
    Inactivity,
    TokenExpired,
    LoggedOut,
}

impl TransitionReason {
    /// Text the interface can show as-is
    pub fn message(&self) -> &'static str {
        match self {
            TransitionReason::SignInStarted => "signing in",
            TransitionReason::SignedIn => "signed in",
            TransitionReason::ServerRejected => "the server rejected the sign-in",
            TransitionReason::ServerUnreachable => "the server could not be reached",
            TransitionReason::Unlocked => "vault unlocked",
            TransitionReason::VaultCreated => "vault created",
            TransitionReason::UserLocked => "you locked the vault",
            TransitionReason::Inactivity => "locked after inactivity",
            TransitionReason::TokenExpired => "your session token expired",
            TransitionReason::LoggedOut => "you signed out",
        }
    }
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Broadcast on every state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: TransitionReason,
}
