//! Error types for vault-http

use thiserror::Error;
use vault_core::VaultError;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid server URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<HttpError> for VaultError {
    fn from(e: HttpError) -> Self {
        VaultError::NetworkError(e.to_string())
    }
}

/// Classify a transport failure for the vault engine
pub(crate) fn transport_error(e: reqwest::Error) -> VaultError {
    if e.is_timeout() {
        VaultError::NetworkError("request timed out".to_string())
    } else if e.is_decode() {
        VaultError::NetworkError(format!("unexpected response body: {}", e))
    } else {
        VaultError::NetworkError(e.to_string())
    }
}

/// Map a non-success HTTP status to the engine's taxonomy
pub(crate) fn status_error(status: reqwest::StatusCode, message: Option<String>) -> VaultError {
    let detail = message.unwrap_or_else(|| status.to_string());
    match status.as_u16() {
        401 | 403 => VaultError::AuthError(detail),
        _ => VaultError::NetworkError(format!("server returned {}: {}", status.as_u16(), detail)),
    }
}
