//! Session state machine
//!
//! `SessionController` is the single owner of the vault key, the decrypted
//! store and the server token. Every operation the interface performs goes
//! through it, which is what makes auto-lock and token refresh work.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use super::config::SessionConfig;
use super::monitor;
use super::state::{SessionState, StateChange, TransitionReason};
use crate::api::{Credentials, TokenGrant, VaultApi};
use crate::crypto::{
    BlobKind, CipherEngine, EncryptedBlob, KeyDerivation, MasterKey, SecretString, VaultParams,
};
use crate::error::{Result, VaultError};
use crate::strength::{PasswordScorer, StrengthScore};
use crate::vault::{
    CategoryId, EntryDraft, EntryId, EntrySummary, EntryVersion, LoadFailure, SearchQuery,
    VaultStore,
};

/// Plaintext of the verification blob
const VERIFICATION_PLAINTEXT: &[u8] = b"vault-verification-v1";

const EVENT_CAPACITY: usize = 64;

/// Called synchronously whenever the vault leaves `Unlocked`
///
/// Hooks run while the controller holds its state lock, so they must not
/// call back into the controller.
pub trait LockHook: Send + Sync {
    fn vault_locked(&self);
}

/// What a successful unlock loaded
#[derive(Debug, Clone, Default)]
pub struct UnlockReport {
    pub loaded: usize,
    pub failed: Vec<LoadFailure>,
}

struct ActiveToken {
    value: SecretString,
    deadline: Instant,
    /// A background refresh of this token already failed; only a user
    /// operation may try again
    background_failed: bool,
}

impl ActiveToken {
    fn from_grant(grant: TokenGrant) -> Self {
        let remaining = (grant.expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or_default();
        Self {
            value: grant.token,
            deadline: Instant::now() + remaining,
            background_failed: false,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Key material and plaintext, present only while `Unlocked`
struct UnlockedVault {
    key: MasterKey,
    store: VaultStore,
    params: VaultParams,
    canary: Option<EncryptedBlob>,
}

impl UnlockedVault {
    fn wipe(&mut self) {
        self.key.zeroize();
        self.store.clear();
    }
}

struct SessionInner {
    state: SessionState,
    token: Option<ActiveToken>,
    last_activity: Instant,
    vault: Option<UnlockedVault>,
    /// Bumped on every transition; work started under an older epoch is discarded
    epoch: u64,
}

struct OpenedVault {
    store: VaultStore,
    failed: Vec<LoadFailure>,
    canary: Option<EncryptedBlob>,
}

pub struct SessionController {
    api: Arc<dyn VaultApi>,
    config: SessionConfig,
    kdf: KeyDerivation,
    cipher: CipherEngine,
    inner: Mutex<SessionInner>,
    /// Serializes unlock, vault creation and master password changes
    unlock_gate: Mutex<()>,
    /// Held shared by every vault write, exclusively by a master password change
    write_gate: RwLock<()>,
    refresh_gate: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<StateChange>,
    lock_hooks: StdMutex<Vec<Weak<dyn LockHook>>>,
    monitor: StdMutex<Option<CancellationToken>>,
}

impl SessionController {
    pub fn new(api: Arc<dyn VaultApi>, config: SessionConfig) -> Arc<Self> {
        let config = config.normalized();
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Arc::new(Self {
            api,
            kdf: KeyDerivation::new(config.kdf_policy.clone()),
            cipher: CipherEngine::new(config.cipher),
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Anonymous,
                token: None,
                last_activity: Instant::now(),
                vault: None,
                epoch: 0,
            }),
            unlock_gate: Mutex::new(()),
            write_gate: RwLock::new(()),
            refresh_gate: Mutex::new(()),
            state_tx,
            events,
            lock_hooks: StdMutex::new(Vec::new()),
            monitor: StdMutex::new(None),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Receiver that always sees the latest state
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Every transition from now on, with its reason
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    pub fn register_lock_hook(&self, hook: Weak<dyn LockHook>) {
        let mut hooks = self.lock_hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.push(hook);
    }

    /// Record user activity, postponing auto-lock
    pub async fn touch(&self) {
        let mut inner = self.inner.lock().await;
        inner.last_activity = Instant::now();
    }

    /// Sign in to the server: `Anonymous | Expired -> Authenticating -> Locked`
    pub async fn authenticate(self: &Arc<Self>, credentials: &Credentials) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Anonymous | SessionState::Expired => {
                    self.transition(&mut inner, SessionState::Authenticating, TransitionReason::SignInStarted)
                }
                actual => return Err(VaultError::InvalidState { actual }),
            }
        }

        let result = self.timed(self.api.authenticate(credentials)).await;

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Authenticating {
            return Err(VaultError::InvalidState { actual: inner.state });
        }

        match result {
            Ok(grant) => {
                inner.token = Some(ActiveToken::from_grant(grant));
                inner.last_activity = Instant::now();
                self.transition(&mut inner, SessionState::Locked, TransitionReason::SignedIn);
                drop(inner);
                self.arm_monitor();
                Ok(())
            }
            Err(e) => {
                inner.token = None;
                let reason = match e {
                    VaultError::AuthError(_) => TransitionReason::ServerRejected,
                    _ => TransitionReason::ServerUnreachable,
                };
                self.transition(&mut inner, SessionState::Anonymous, reason);
                Err(e)
            }
        }
    }

    /// Derive the vault key and decrypt the vault: `Locked -> Unlocked`
    ///
    /// On any failure (wrong password, timeout, cancellation) the session
    /// stays `Locked` and the derived key is wiped. A second call while one
    /// is running fails with `UnlockInProgress`.
    pub async fn unlock(&self, master_password: SecretString) -> Result<UnlockReport> {
        let _gate = self
            .unlock_gate
            .try_lock()
            .map_err(|_| VaultError::UnlockInProgress)?;

        let epoch = {
            let inner = self.inner.lock().await;
            match inner.state {
                SessionState::Locked => inner.epoch,
                SessionState::Unlocked => {
                    debug!("Vault already unlocked");
                    return Ok(UnlockReport::default());
                }
                actual => return Err(VaultError::InvalidState { actual }),
            }
        };

        info!("Unlocking vault");
        let params = self
            .call_api(|api, token| async move { api.fetch_vault_params(&token).await })
            .await?
            .ok_or(VaultError::VaultNotInitialized)?;

        let key = self.derive_key(master_password, params.clone()).await?;

        let blobs = self
            .call_api(|api, token| async move { api.fetch_vault_blobs(&token).await })
            .await?;

        let cipher = self.cipher;
        let (key, opened) = tokio::task::spawn_blocking(move || {
            let opened = open_vault(&blobs, &key, cipher);
            (key, opened)
        })
        .await
        .map_err(|e| VaultError::UnlockFailed(format!("vault decryption task failed: {}", e)))?;
        let opened = opened?;

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Locked || inner.epoch != epoch {
            warn!("Session changed while unlocking, discarding derived key");
            return Err(VaultError::UnlockFailed(
                "session changed while unlocking".to_string(),
            ));
        }

        let report = UnlockReport {
            loaded: opened.store.len(),
            failed: opened.failed,
        };
        inner.vault = Some(UnlockedVault {
            key,
            store: opened.store,
            params,
            canary: opened.canary,
        });
        inner.last_activity = Instant::now();
        self.transition(&mut inner, SessionState::Unlocked, TransitionReason::Unlocked);
        Ok(report)
    }

    /// Create the vault on the server for an account that has none
    ///
    /// Generates fresh parameters, stores them with a verification blob and
    /// an empty category tree, and leaves the session `Unlocked`.
    pub async fn initialize_vault(&self, master_password: SecretString) -> Result<()> {
        let _gate = self
            .unlock_gate
            .try_lock()
            .map_err(|_| VaultError::UnlockInProgress)?;

        if master_password.is_empty() {
            return Err(VaultError::Validation("master password must not be empty".to_string()));
        }

        let epoch = {
            let inner = self.inner.lock().await;
            if inner.state != SessionState::Locked {
                return Err(VaultError::InvalidState { actual: inner.state });
            }
            inner.epoch
        };

        let existing = self
            .call_api(|api, token| async move { api.fetch_vault_params(&token).await })
            .await?;
        if existing.is_some() {
            return Err(VaultError::InvalidState {
                actual: SessionState::Locked,
            });
        }

        let params = VaultParams::generate(self.config.new_vault_kdf, self.config.new_vault_iterations);
        let key = self.derive_key(master_password, params.clone()).await?;

        let canary = self
            .cipher
            .encrypt(Uuid::new_v4(), BlobKind::Verification, VERIFICATION_PLAINTEXT, &key)?;
        let store = VaultStore::new(self.cipher);
        let tree = store.encrypt_categories(&key)?;

        let stored = &params;
        self.call_api(|api, token| async move { api.store_vault_params(&token, stored).await })
            .await?;
        self.persist(&canary).await?;
        self.persist(&tree).await?;

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Locked || inner.epoch != epoch {
            return Err(VaultError::UnlockFailed(
                "session changed while creating the vault".to_string(),
            ));
        }
        inner.vault = Some(UnlockedVault {
            key,
            store,
            params,
            canary: Some(canary),
        });
        inner.last_activity = Instant::now();
        self.transition(&mut inner, SessionState::Unlocked, TransitionReason::VaultCreated);
        Ok(())
    }

    /// Lock the vault, wiping the key and all plaintext
    pub async fn lock(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Unlocked {
            self.transition(&mut inner, SessionState::Locked, TransitionReason::UserLocked);
        } else {
            debug!("Lock requested in state {}, nothing to do", inner.state);
        }
    }

    /// Sign out completely
    ///
    /// An unlocked vault is locked first and the token is given up (the
    /// session passes through `Expired`), then the server is asked to revoke
    /// it and the session ends in `Anonymous` with no cached token.
    pub async fn logout(&self) {
        let token = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Unlocked {
                self.transition(&mut inner, SessionState::Locked, TransitionReason::LoggedOut);
            }
            if inner.state == SessionState::Locked {
                self.transition(&mut inner, SessionState::Expired, TransitionReason::LoggedOut);
            }
            inner.token.take()
        };
        self.disarm_monitor();

        if let Some(token) = token {
            if let Err(e) = self.timed(self.api.logout(&token.value)).await {
                warn!("Server-side logout failed: {}", e);
            }
        }

        let mut inner = self.inner.lock().await;
        inner.token = None;
        if inner.state != SessionState::Anonymous {
            self.transition(&mut inner, SessionState::Anonymous, TransitionReason::LoggedOut);
        }
    }

    /// Read access to the decrypted vault
    pub async fn with_store<R>(&self, f: impl FnOnce(&VaultStore) -> R) -> Result<R> {
        let mut inner = self.inner.lock().await;
        let vault = Self::unlocked(&mut inner)?;
        Ok(f(&vault.store))
    }

    /// Summaries of every entry matching `query`, in store order
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<EntrySummary>> {
        self.with_store(|store| store.search(query).map(EntrySummary::from).collect())
            .await
    }

    pub async fn reveal_password(&self, id: EntryId) -> Result<SecretString> {
        self.with_store(|store| store.get(id).map(|e| e.password.clone()))
            .await?
            .ok_or(VaultError::EntryNotFound(id))
    }

    pub async fn history(&self, id: EntryId) -> Result<Vec<EntryVersion>> {
        self.with_store(|store| store.history(id).map(<[EntryVersion]>::to_vec))
            .await?
    }

    /// In-memory upsert; the caller persists the returned blob
    pub async fn upsert_entry(&self, draft: &EntryDraft) -> Result<EncryptedBlob> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, key| store.upsert(draft, key)).await
    }

    /// In-memory delete; the caller removes the blob from the server
    pub async fn delete_entry(&self, id: EntryId) -> Result<()> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, _| store.delete(id)).await
    }

    /// Upsert and persist, returning the entry id
    pub async fn save_entry(&self, draft: &EntryDraft) -> Result<EntryId> {
        let _writes = self.write_gate.read().await;
        let blob = self.mutate(|store, key| store.upsert(draft, key)).await?;
        self.persist(&blob).await?;
        Ok(blob.id)
    }

    /// Delete locally and on the server
    pub async fn remove_entry(&self, id: EntryId) -> Result<()> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, _| store.delete(id)).await?;
        self.call_api(|api, token| async move { api.delete_blob(&token, id).await })
            .await
    }

    /// Make an old revision current again and persist it
    pub async fn restore_version(&self, id: EntryId, index: usize) -> Result<()> {
        let _writes = self.write_gate.read().await;
        let blob = self
            .mutate(|store, key| store.restore_version(id, index, key))
            .await?;
        self.persist(&blob).await
    }

    pub async fn add_category(
        &self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<(CategoryId, EncryptedBlob)> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, key| store.add_category(name, parent, key))
            .await
    }

    pub async fn rename_category(&self, id: CategoryId, name: &str) -> Result<EncryptedBlob> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, key| store.rename_category(id, name, key))
            .await
    }

    pub async fn move_category(
        &self,
        id: CategoryId,
        parent: Option<CategoryId>,
    ) -> Result<EncryptedBlob> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, key| store.move_category(id, parent, key))
            .await
    }

    pub async fn remove_category(&self, id: CategoryId) -> Result<Vec<EncryptedBlob>> {
        let _writes = self.write_gate.read().await;
        self.mutate(|store, key| store.remove_category(id, key)).await
    }

    /// Persist the blobs returned by a category mutation
    ///
    /// Blobs that no longer open under the current key (the master password
    /// changed since they were produced) are refused.
    pub async fn save_categories(&self, blobs: &[EncryptedBlob]) -> Result<()> {
        let _writes = self.write_gate.read().await;
        {
            let mut inner = self.inner.lock().await;
            let vault = Self::unlocked(&mut inner)?;
            for blob in blobs {
                if self.cipher.decrypt(blob, &vault.key).is_err() {
                    return Err(VaultError::Validation(format!(
                        "blob {} was encrypted under a previous master password",
                        blob.id
                    )));
                }
            }
        }
        for blob in blobs {
            self.persist(blob).await?;
        }
        Ok(())
    }

    /// Re-key the vault under a new master password
    ///
    /// Every blob is re-encrypted and uploaded before the new parameters are
    /// stored; the old key is only replaced (and wiped) after the server has
    /// everything. Vault writes wait until the new key is in place.
    pub async fn change_master_password(
        &self,
        current: SecretString,
        new: SecretString,
    ) -> Result<()> {
        let _gate = self
            .unlock_gate
            .try_lock()
            .map_err(|_| VaultError::UnlockInProgress)?;

        if new.is_empty() {
            return Err(VaultError::Validation("master password must not be empty".to_string()));
        }
        let _writes = self.write_gate.write().await;

        let (params, epoch) = {
            let mut inner = self.inner.lock().await;
            let epoch = inner.epoch;
            let vault = Self::unlocked(&mut inner)?;
            (vault.params.clone(), epoch)
        };

        let check = self.derive_key(current, params).await?;
        let new_params =
            VaultParams::generate(self.config.new_vault_kdf, self.config.new_vault_iterations);
        let new_key = self.derive_key(new, new_params.clone()).await?;

        let (blobs, canary) = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return Err(VaultError::NotUnlocked);
            }
            let vault = Self::unlocked(&mut inner)?;
            match &vault.canary {
                Some(canary) => verify_canary(canary, &check)?,
                None if check.as_bytes() != vault.key.as_bytes() => {
                    return Err(VaultError::UnlockFailed(
                        "master password is incorrect".to_string(),
                    ))
                }
                None => {}
            }

            let canary_id = vault.canary.as_ref().map_or_else(Uuid::new_v4, |c| c.id);
            let canary = self
                .cipher
                .encrypt(canary_id, BlobKind::Verification, VERIFICATION_PLAINTEXT, &new_key)?;
            (vault.store.encrypt_all(&new_key)?, canary)
        };

        for blob in &blobs {
            self.persist(blob).await?;
        }
        self.persist(&canary).await?;
        let stored = &new_params;
        self.call_api(|api, token| async move { api.store_vault_params(&token, stored).await })
            .await?;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            warn!("Vault locked while changing the master password");
            return Err(VaultError::NotUnlocked);
        }
        let vault = Self::unlocked(&mut inner)?;
        vault.key = new_key;
        vault.params = new_params;
        vault.canary = Some(canary);
        info!("Master password changed, {} blobs re-encrypted", blobs.len());
        Ok(())
    }

    /// Forward a candidate password to the injected scorer
    pub fn score_password(&self, scorer: &dyn PasswordScorer, candidate: &SecretString) -> StrengthScore {
        crate::strength::evaluate(scorer, candidate)
    }

    /// One round of the background checks: inactivity, then token expiry
    pub(crate) async fn check_timers(&self) {
        let stale = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Unlocked
                && inner.last_activity.elapsed() >= self.config.auto_lock_timeout
            {
                self.transition(&mut inner, SessionState::Locked, TransitionReason::Inactivity);
            }

            match (&inner.state, &inner.token) {
                (SessionState::Locked | SessionState::Unlocked, Some(token))
                    if token.is_expired() && !token.background_failed =>
                {
                    Some(token.value.clone())
                }
                _ => None,
            }
        };

        if let Some(stale) = stale {
            debug!("Session token expired, refreshing");
            match self.refresh(&stale).await {
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!("Token refresh failed, waiting for the next operation: {}", e);
                    let mut inner = self.inner.lock().await;
                    if let Some(token) = inner.token.as_mut().filter(|t| t.value == stale) {
                        token.background_failed = true;
                    }
                    if inner.state == SessionState::Unlocked {
                        self.transition(&mut inner, SessionState::Locked, TransitionReason::TokenExpired);
                    }
                }
                Err(e) => debug!("Token refresh failed: {}", e),
            }
        }
    }

    fn unlocked(inner: &mut SessionInner) -> Result<&mut UnlockedVault> {
        if inner.state != SessionState::Unlocked {
            return Err(VaultError::NotUnlocked);
        }
        inner.last_activity = Instant::now();
        inner.vault.as_mut().ok_or(VaultError::NotUnlocked)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut VaultStore, &MasterKey) -> Result<R>) -> Result<R> {
        let mut inner = self.inner.lock().await;
        let vault = Self::unlocked(&mut inner)?;
        f(&mut vault.store, &vault.key)
    }

    async fn persist(&self, blob: &EncryptedBlob) -> Result<()> {
        self.call_api(|api, token| async move { api.persist_blob(&token, blob).await })
            .await
    }

    async fn derive_key(&self, password: SecretString, params: VaultParams) -> Result<MasterKey> {
        let kdf = self.kdf.clone();
        tokio::task::spawn_blocking(move || kdf.derive_with(password.expose().as_bytes(), &params))
            .await
            .map_err(|e| VaultError::UnlockFailed(format!("key derivation task failed: {}", e)))?
    }

    async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.network_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(VaultError::NetworkError(format!(
                    "request timed out after {}s",
                    self.config.network_timeout.as_secs()
                )))
            })
    }

    /// Run an authenticated API call, refreshing the token at most once
    async fn call_api<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn VaultApi>, SecretString) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (token, refreshed) = self.current_token().await?;
        match self.timed(op(Arc::clone(&self.api), token.clone())).await {
            Err(VaultError::AuthError(reason)) if !refreshed => {
                debug!("Server rejected token ({}), refreshing once", reason);
                let token = self.refresh(&token).await?;
                match self.timed(op(Arc::clone(&self.api), token)).await {
                    Err(VaultError::AuthError(_)) => {
                        self.expire(TransitionReason::ServerRejected).await;
                        Err(VaultError::SessionExpired)
                    }
                    other => other,
                }
            }
            Err(VaultError::AuthError(_)) => {
                self.expire(TransitionReason::ServerRejected).await;
                Err(VaultError::SessionExpired)
            }
            other => other,
        }
    }

    /// Usable token, refreshed first if its deadline has passed
    async fn current_token(&self) -> Result<(SecretString, bool)> {
        let stale = {
            let inner = self.inner.lock().await;
            match inner.state {
                SessionState::Locked | SessionState::Unlocked => {}
                SessionState::Expired => return Err(VaultError::SessionExpired),
                actual => return Err(VaultError::InvalidState { actual }),
            }
            let token = inner.token.as_ref().ok_or(VaultError::SessionExpired)?;
            if !token.is_expired() {
                return Ok((token.value.clone(), false));
            }
            token.value.clone()
        };

        let token = self.refresh(&stale).await?;
        Ok((token, true))
    }

    /// Exchange `stale` for a new token
    ///
    /// A rejected refresh moves the session to `Expired`. Concurrent callers
    /// holding the same stale token share one refresh.
    async fn refresh(&self, stale: &SecretString) -> Result<SecretString> {
        let _gate = self.refresh_gate.lock().await;
        {
            let inner = self.inner.lock().await;
            if let Some(token) = &inner.token {
                if token.value != *stale && !token.is_expired() {
                    return Ok(token.value.clone());
                }
            }
        }

        match self.timed(self.api.refresh_token(stale)).await {
            Ok(grant) => {
                let mut inner = self.inner.lock().await;
                if !matches!(inner.state, SessionState::Locked | SessionState::Unlocked) {
                    return Err(VaultError::InvalidState { actual: inner.state });
                }
                let token = ActiveToken::from_grant(grant);
                let value = token.value.clone();
                inner.token = Some(token);
                info!("Session token refreshed");
                Ok(value)
            }
            Err(VaultError::AuthError(reason)) => {
                warn!("Token refresh rejected: {}", reason);
                self.expire(TransitionReason::TokenExpired).await;
                Err(VaultError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn expire(&self, reason: TransitionReason) {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Locked | SessionState::Unlocked) {
            self.transition(&mut inner, SessionState::Expired, reason);
            drop(inner);
            self.disarm_monitor();
        }
    }

    fn transition(&self, inner: &mut SessionInner, to: SessionState, reason: TransitionReason) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        // Published before the hooks run, so anything re-checking the state
        // after a hook has cleared up sees the new one
        self.state_tx.send_replace(to);

        if from == SessionState::Unlocked && to != SessionState::Unlocked {
            if let Some(mut vault) = inner.vault.take() {
                vault.wipe();
            }
            self.run_lock_hooks();
        }

        info!("Session {} -> {} ({})", from, to, reason);
        // No subscribers is fine
        let _ = self.events.send(StateChange { from, to, reason });
    }

    fn run_lock_hooks(&self) {
        let mut hooks = self.lock_hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.retain(|hook| match hook.upgrade() {
            Some(hook) => {
                hook.vault_locked();
                true
            }
            None => false,
        });
    }

    fn arm_monitor(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        let previous = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        monitor::spawn(Arc::downgrade(self), self.config.check_interval, cancel);
    }

    fn disarm_monitor(&self) {
        let current = self.monitor.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(cancel) = current {
            cancel.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn monitor_armed(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disarm_monitor();
    }
}

fn open_vault(blobs: &[EncryptedBlob], key: &MasterKey, cipher: CipherEngine) -> Result<OpenedVault> {
    let canary = blobs
        .iter()
        .find(|b| b.kind == BlobKind::Verification)
        .cloned();
    if let Some(canary) = &canary {
        verify_canary(canary, key)?;
    }

    let loaded = VaultStore::load(blobs, key, cipher);

    // Without a verification blob, a key that opens nothing is a wrong key
    if canary.is_none() {
        let attempted = blobs
            .iter()
            .filter(|b| b.kind != BlobKind::Verification)
            .count();
        if attempted > 0 && loaded.failed.len() == attempted {
            return Err(VaultError::UnlockFailed(
                "master password is incorrect".to_string(),
            ));
        }
    }

    Ok(OpenedVault {
        store: loaded.store,
        failed: loaded.failed,
        canary,
    })
}

fn verify_canary(blob: &EncryptedBlob, key: &MasterKey) -> Result<()> {
    match crate::crypto::decrypt(blob, key) {
        Ok(plaintext) if plaintext.as_slice() == VERIFICATION_PLAINTEXT => Ok(()),
        Ok(_) => Err(VaultError::UnlockFailed(
            "verification blob has unexpected contents".to_string(),
        )),
        Err(VaultError::AuthFailure) => Err(VaultError::UnlockFailed(
            "master password is incorrect".to_string(),
        )),
        Err(e) => Err(VaultError::UnlockFailed(e.to_string())),
    }
}
