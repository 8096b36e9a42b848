//! Test doubles shared by the unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::api::{Credentials, TokenGrant, VaultApi};
use crate::crypto::{EncryptedBlob, KdfPolicy, SecretString, VaultParams};
use crate::error::{Result, VaultError};
use crate::session::{SessionConfig, SessionController};

pub(crate) const EMAIL: &str = "alice@example.org";
pub(crate) const ACCOUNT_PASSWORD: &str = "account-password";
pub(crate) const MASTER_PASSWORD: &str = "correct horse battery staple";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshMode {
    Succeed,
    Reject,
    Unreachable,
}

struct MockState {
    params: Option<VaultParams>,
    blobs: IndexMap<Uuid, EncryptedBlob>,
    valid_tokens: HashSet<String>,
    issued: usize,
    token_lifetime: chrono::Duration,
    refresh: RefreshMode,
    fetch_delay: Duration,
    persist_delay: Duration,
    offline: bool,
}

/// In-memory stand-in for the vault server
pub(crate) struct MockApi {
    state: Mutex<MockState>,
    refresh_calls: AtomicUsize,
    persist_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                params: None,
                blobs: IndexMap::new(),
                valid_tokens: HashSet::new(),
                issued: 0,
                token_lifetime: chrono::Duration::hours(1),
                refresh: RefreshMode::Succeed,
                fetch_delay: Duration::ZERO,
                persist_delay: Duration::ZERO,
                offline: false,
            }),
            refresh_calls: AtomicUsize::new(0),
            persist_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_token_lifetime(&self, lifetime: chrono::Duration) {
        self.with_state(|s| s.token_lifetime = lifetime);
    }

    pub fn set_refresh(&self, mode: RefreshMode) {
        self.with_state(|s| s.refresh = mode);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.with_state(|s| s.fetch_delay = delay);
    }

    pub fn set_persist_delay(&self, delay: Duration) {
        self.with_state(|s| s.persist_delay = delay);
    }

    pub fn set_offline(&self, offline: bool) {
        self.with_state(|s| s.offline = offline);
    }

    /// Invalidate every issued token, as if the server rotated its keys
    pub fn revoke_tokens(&self) {
        self.with_state(|s| s.valid_tokens.clear());
    }

    pub fn blobs(&self) -> Vec<EncryptedBlob> {
        self.with_state(|s| s.blobs.values().cloned().collect())
    }

    pub fn insert_blob(&self, blob: EncryptedBlob) {
        self.with_state(|s| s.blobs.insert(blob.id, blob));
    }

    pub fn set_params(&self, params: VaultParams) {
        self.with_state(|s| s.params = Some(params));
    }

    pub fn params(&self) -> Option<VaultParams> {
        self.with_state(|s| s.params.clone())
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> TokenGrant {
        self.with_state(|s| {
            s.issued += 1;
            let token = format!("token-{}", s.issued);
            s.valid_tokens.insert(token.clone());
            TokenGrant {
                token: SecretString::new(token),
                expires_at: Utc::now() + s.token_lifetime,
            }
        })
    }

    fn check(&self, token: &SecretString) -> Result<()> {
        self.with_state(|s| {
            if s.offline {
                return Err(VaultError::NetworkError("connection refused".to_string()));
            }
            if !s.valid_tokens.contains(token.expose()) {
                return Err(VaultError::AuthError("invalid token".to_string()));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl VaultApi for MockApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant> {
        if self.with_state(|s| s.offline) {
            return Err(VaultError::NetworkError("connection refused".to_string()));
        }
        if credentials.email != EMAIL || credentials.password.expose() != ACCOUNT_PASSWORD {
            return Err(VaultError::AuthError("invalid credentials".to_string()));
        }
        Ok(self.issue())
    }

    async fn refresh_token(&self, token: &SecretString) -> Result<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match self.with_state(|s| s.refresh) {
            RefreshMode::Succeed => {
                self.with_state(|s| s.valid_tokens.remove(token.expose()));
                Ok(self.issue())
            }
            RefreshMode::Reject => Err(VaultError::AuthError("refresh token revoked".to_string())),
            RefreshMode::Unreachable => {
                Err(VaultError::NetworkError("connection refused".to_string()))
            }
        }
    }

    async fn logout(&self, token: &SecretString) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| s.valid_tokens.remove(token.expose()));
        Ok(())
    }

    async fn fetch_vault_params(&self, token: &SecretString) -> Result<Option<VaultParams>> {
        self.check(token)?;
        Ok(self.params())
    }

    async fn store_vault_params(&self, token: &SecretString, params: &VaultParams) -> Result<()> {
        self.check(token)?;
        self.with_state(|s| s.params = Some(params.clone()));
        Ok(())
    }

    async fn fetch_vault_blobs(&self, token: &SecretString) -> Result<Vec<EncryptedBlob>> {
        let delay = self.with_state(|s| s.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(token)?;
        Ok(self.blobs())
    }

    async fn persist_blob(&self, token: &SecretString, blob: &EncryptedBlob) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.with_state(|s| s.persist_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(token)?;
        self.insert_blob(blob.clone());
        Ok(())
    }

    async fn delete_blob(&self, token: &SecretString, id: Uuid) -> Result<()> {
        self.check(token)?;
        self.with_state(|s| s.blobs.shift_remove(&id));
        Ok(())
    }
}

/// Fast KDF settings and a one-second monitor period
pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        auto_lock_timeout: Duration::from_secs(300),
        check_interval: Duration::from_secs(1),
        network_timeout: Duration::from_secs(30),
        kdf_policy: KdfPolicy {
            min_pbkdf2_iterations: 1_000,
            ..KdfPolicy::default()
        },
        new_vault_iterations: 1_000,
        ..SessionConfig::default()
    }
}

pub(crate) fn credentials() -> Credentials {
    Credentials::new(EMAIL, SecretString::from(ACCOUNT_PASSWORD))
}

/// Signed-in controller whose vault was just created (state `Unlocked`)
pub(crate) async fn unlocked_session(api: &Arc<MockApi>, config: SessionConfig) -> Arc<SessionController> {
    let controller = SessionController::new(api.clone(), config);
    controller.authenticate(&credentials()).await.unwrap();
    controller
        .initialize_vault(SecretString::from(MASTER_PASSWORD))
        .await
        .unwrap();
    controller
}

/// Let spawned tasks run to their next await point
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
