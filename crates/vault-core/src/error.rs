//! Error types for vault-core

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    /// Derivation parameters are below the configured minimums
    #[error("Key derivation parameters too weak: {0}")]
    WeakParameters(String),

    /// Derivation parameters are malformed
    #[error("Invalid key derivation parameters: {0}")]
    InvalidParameters(String),

    /// Wrong key or tampered blob
    #[error("Authentication failed - wrong key or tampered data")]
    AuthFailure,

    /// Blob version or algorithm tag this build does not understand
    #[error("Unsupported blob: {0}")]
    UnsupportedBlob(String),

    #[error("Unlock failed: {0}")]
    UnlockFailed(String),

    /// Server rejected credentials or token
    #[error("Authentication rejected by server: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Category move would create a cycle: {0}")]
    CycleDetected(uuid::Uuid),

    #[error("Vault is locked - unlock with master password first")]
    NotUnlocked,

    #[error("An unlock is already in progress")]
    UnlockInProgress,

    #[error("Operation not allowed in state {actual:?}")]
    InvalidState { actual: SessionState },

    #[error("Vault is not initialized on the server")]
    VaultNotInitialized,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(uuid::Uuid),

    #[error("Category not found: {0}")]
    CategoryNotFound(uuid::Uuid),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::NetworkError(_))
    }
}
