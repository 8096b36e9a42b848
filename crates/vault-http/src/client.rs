//! reqwest implementation of [`VaultApi`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;
use vault_core::{
    Credentials, EncryptedBlob, Result, SecretString, TokenGrant, VaultApi, VaultError,
    VaultParams,
};

use crate::error::{status_error, transport_error, HttpError};
use crate::wire::{
    EntriesResponse, ErrorResponse, LoginRequest, RefreshRequest, SaltResponse, TokenResponse,
};

/// Client for the password manager server
#[derive(Debug, Clone)]
pub struct HttpVaultApi {
    client: Client,
    base_url: Url,
}

impl HttpVaultApi {
    /// Create a client for `base_url` with a per-request `timeout`
    ///
    /// A bare `localhost` or `127.0.0.1` address gets `http://` prepended;
    /// anything else must name its scheme.
    pub fn new(base_url: &str, timeout: Duration) -> std::result::Result<Self, HttpError> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;

        info!("Using vault server at {}", base_url);
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| VaultError::NetworkError(format!("invalid request path {}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str, token: Option<&SecretString>) -> Result<RequestBuilder> {
        let mut request = self.client.request(method, self.url(path)?);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose());
        }
        Ok(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        debug!("{} {}", response.status().as_u16(), response.url().path());
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(transport_error)
    }
}

/// Pass successful responses through, turn the rest into engine errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.message);
    Err(status_error(status, message))
}

fn parse_base_url(raw: &str) -> std::result::Result<Url, HttpError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        format!("http://{}", trimmed)
    } else {
        return Err(HttpError::InvalidBaseUrl(format!(
            "{} (must start with http:// or https://)",
            raw
        )));
    };

    // Trailing slash so relative joins keep any path prefix
    Url::parse(&format!("{}/", with_scheme)).map_err(|e| HttpError::InvalidBaseUrl(e.to_string()))
}

#[async_trait]
impl VaultApi for HttpVaultApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant> {
        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
        };
        let response: TokenResponse = self
            .send_json(self.request(Method::POST, "/api/login", None)?.json(&body))
            .await?;
        Ok(response.into_grant())
    }

    async fn refresh_token(&self, token: &SecretString) -> Result<TokenGrant> {
        let body = RefreshRequest { token };
        let response: TokenResponse = self
            .send_json(
                self.request(Method::POST, "/api/token/refresh", Some(token))?
                    .json(&body),
            )
            .await?;
        Ok(response.into_grant())
    }

    async fn logout(&self, token: &SecretString) -> Result<()> {
        self.send(self.request(Method::POST, "/api/logout", Some(token))?)
            .await?;
        Ok(())
    }

    async fn fetch_vault_params(&self, token: &SecretString) -> Result<Option<VaultParams>> {
        let request = self.request(Method::GET, "/api/vault/salt", Some(token))?;
        let response = request.send().await.map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Server has no vault for this account");
            return Ok(None);
        }

        let salt: SaltResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        salt.into_params()
            .map(Some)
            .map_err(|e| VaultError::InvalidParameters(format!("salt is not valid base64: {}", e)))
    }

    async fn store_vault_params(&self, token: &SecretString, params: &VaultParams) -> Result<()> {
        self.send(
            self.request(Method::POST, "/api/vault/setup", Some(token))?
                .json(params),
        )
        .await?;
        Ok(())
    }

    async fn fetch_vault_blobs(&self, token: &SecretString) -> Result<Vec<EncryptedBlob>> {
        let response: EntriesResponse = self
            .send_json(self.request(Method::GET, "/api/vault/entries", Some(token))?)
            .await?;
        debug!("Fetched {} blobs", response.entries.len());
        Ok(response.entries)
    }

    async fn persist_blob(&self, token: &SecretString, blob: &EncryptedBlob) -> Result<()> {
        let path = format!("/api/vault/entries/{}", blob.id);
        self.send(self.request(Method::PUT, &path, Some(token))?.json(blob))
            .await?;
        Ok(())
    }

    async fn delete_blob(&self, token: &SecretString, id: Uuid) -> Result<()> {
        let path = format!("/api/vault/entries/{}", id);
        self.send(self.request(Method::DELETE, &path, Some(token))?)
            .await?;
        Ok(())
    }
}
