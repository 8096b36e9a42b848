//! Remote API collaborator
//!
//! The vault engine never talks HTTP itself. Everything it needs from the
//! server goes through [`VaultApi`], which a transport crate implements and
//! the application injects into the session controller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crypto::{EncryptedBlob, SecretString, VaultParams};
use crate::error::Result;

/// Account credentials for the server (not the master password)
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: &str, password: SecretString) -> Self {
        Self {
            email: email.to_string(),
            password,
        }
    }
}

/// Access token issued by the server
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

/// Server operations the vault engine relies on
///
/// Implementations report rejected credentials or tokens as
/// `VaultError::AuthError` and everything else that went wrong on the wire
/// as `VaultError::NetworkError`.
#[async_trait]
pub trait VaultApi: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant>;

    async fn refresh_token(&self, token: &SecretString) -> Result<TokenGrant>;

    /// Revoke the token server-side
    async fn logout(&self, token: &SecretString) -> Result<()>;

    /// KDF parameters of the user's vault, `None` if it was never set up
    async fn fetch_vault_params(&self, token: &SecretString) -> Result<Option<VaultParams>>;

    async fn store_vault_params(&self, token: &SecretString, params: &VaultParams) -> Result<()>;

    async fn fetch_vault_blobs(&self, token: &SecretString) -> Result<Vec<EncryptedBlob>>;

    /// Create or replace the blob with `blob.id`
    async fn persist_blob(&self, token: &SecretString, blob: &EncryptedBlob) -> Result<()>;

    async fn delete_blob(&self, token: &SecretString, id: Uuid) -> Result<()>;
}
