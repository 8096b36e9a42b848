//! Request and response bodies of the server's REST API

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vault_core::{EncryptedBlob, KdfAlgorithm, SecretString, TokenGrant, VaultParams};

/// Token lifetime assumed when the server does not say
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Iteration count of vaults whose salt response carries no KDF details
pub(crate) const LEGACY_PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a SecretString,
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub token: &'a SecretString,
}

#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: SecretString,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn into_grant(self) -> TokenGrant {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            Utc::now() + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
        });
        TokenGrant {
            token: self.access_token,
            expires_at,
        }
    }
}

/// `GET /api/vault/salt`
///
/// Older servers only return the salt; those vaults use PBKDF2-HMAC-SHA256
/// with [`LEGACY_PBKDF2_ITERATIONS`].
#[derive(Deserialize)]
pub(crate) struct SaltResponse {
    pub salt: String,
    #[serde(default)]
    pub algorithm: Option<KdfAlgorithm>,
    #[serde(default)]
    pub iterations: Option<u32>,
}

impl SaltResponse {
    pub fn into_params(self) -> Result<VaultParams, base64::DecodeError> {
        use base64::Engine;

        Ok(VaultParams {
            salt: base64::engine::general_purpose::STANDARD.decode(self.salt.trim())?,
            algorithm: self.algorithm.unwrap_or(KdfAlgorithm::Pbkdf2HmacSha256),
            iterations: self.iterations.unwrap_or(LEGACY_PBKDF2_ITERATIONS),
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct EntriesResponse {
    pub entries: Vec<EncryptedBlob>,
}

#[derive(Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: Option<String>,
}
