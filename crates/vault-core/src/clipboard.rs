//! Time-boxed clipboard exposure of secrets
//!
//! [`ClipboardGuard::copy`] puts a secret on the clipboard and guarantees it
//! is taken off again: after the TTL, or as soon as the vault leaves
//! `Unlocked`, whichever comes first. Clearing only ever removes what the
//! guard itself placed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::session::{LockHook, SessionController, SessionState};

/// Default time a copied secret stays on the clipboard
pub const DEFAULT_CLIPBOARD_TTL: Duration = Duration::from_secs(30);

/// System clipboard access
pub trait ClipboardBackend: Send + Sync {
    /// Current text content, `None` if the clipboard holds no text
    fn get_text(&self) -> Result<Option<String>>;

    fn set_text(&self, text: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Process-local clipboard for tests and headless use
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn get_text(&self) -> Result<Option<String>> {
        let content = self.content.lock().unwrap_or_else(|e| e.into_inner());
        Ok(content.clone())
    }

    fn set_text(&self, text: &str) -> Result<()> {
        let mut content = self.content.lock().unwrap_or_else(|e| e.into_inner());
        *content = Some(text.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut content = self.content.lock().unwrap_or_else(|e| e.into_inner());
        *content = None;
        Ok(())
    }
}

/// What the guard last placed on the clipboard
struct Placed {
    text: Zeroizing<String>,
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct ClipboardGuard {
    backend: Arc<dyn ClipboardBackend>,
    state: watch::Receiver<SessionState>,
    placed: Mutex<Option<Placed>>,
    generation: AtomicU64,
}

impl ClipboardGuard {
    /// Create a guard tied to `session`'s lock state
    pub fn new(backend: Arc<dyn ClipboardBackend>, session: &SessionController) -> Arc<Self> {
        let guard = Arc::new(Self {
            backend,
            state: session.watch_state(),
            placed: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        let hook: Weak<dyn LockHook> = Arc::downgrade(&guard) as Weak<dyn LockHook>;
        session.register_lock_hook(hook);
        guard
    }

    fn is_unlocked(&self) -> bool {
        *self.state.borrow() == SessionState::Unlocked
    }

    /// Place `secret` on the clipboard for at most `ttl`
    ///
    /// Must be called from within a tokio runtime. Fails with `NotUnlocked`
    /// unless the vault is unlocked; a later copy replaces the earlier one
    /// and its timer.
    pub fn copy(self: &Arc<Self>, secret: &SecretString, ttl: Duration) -> Result<()> {
        if !self.is_unlocked() {
            return Err(VaultError::NotUnlocked);
        }

        self.backend.set_text(secret.expose())?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(guard) = weak.upgrade() {
                guard.expire(generation);
            }
        });

        let previous = self.lock_placed().replace(Placed {
            text: Zeroizing::new(secret.expose().to_string()),
            generation,
            timer,
        });
        if let Some(previous) = previous {
            previous.timer.abort();
        }
        debug!("Copied secret to clipboard for {}s", ttl.as_secs());

        // The vault may have locked between the check above and now
        if !self.is_unlocked() {
            self.clear_now()?;
            return Err(VaultError::NotUnlocked);
        }
        Ok(())
    }

    /// Take our secret off the clipboard right away
    ///
    /// Returns whether anything was cleared. Content the user copied since
    /// is left alone.
    pub fn clear_now(&self) -> Result<bool> {
        let Some(placed) = self.lock_placed().take() else {
            return Ok(false);
        };
        placed.timer.abort();
        self.clear_if_unchanged(&placed)
    }

    /// Whether a secret placed by this guard is still pending
    pub fn is_armed(&self) -> bool {
        self.lock_placed().is_some()
    }

    fn expire(&self, generation: u64) {
        let placed = {
            let mut slot = self.lock_placed();
            match slot.as_ref() {
                Some(placed) if placed.generation == generation => slot.take(),
                _ => None,
            }
        };

        if let Some(placed) = placed {
            match self.clear_if_unchanged(&placed) {
                Ok(true) => debug!("Clipboard cleared after timeout"),
                Ok(false) => debug!("Clipboard changed since copy, left untouched"),
                Err(e) => warn!("Failed to clear clipboard: {}", e),
            }
        }
    }

    fn clear_if_unchanged(&self, placed: &Placed) -> Result<bool> {
        let current = self.backend.get_text()?.map(Zeroizing::new);
        if current.as_deref().map(String::as_str) != Some(placed.text.as_str()) {
            return Ok(false);
        }
        self.backend.clear()?;
        Ok(true)
    }

    fn lock_placed(&self) -> std::sync::MutexGuard<'_, Option<Placed>> {
        self.placed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LockHook for ClipboardGuard {
    fn vault_locked(&self) {
        match self.clear_now() {
            Ok(true) => debug!("Clipboard cleared on lock"),
            Ok(false) => {}
            Err(e) => warn!("Failed to clear clipboard on lock: {}", e),
        }
    }
}

impl Drop for ClipboardGuard {
    fn drop(&mut self) {
        if let Err(e) = self.clear_now() {
            warn!("Failed to clear clipboard: {}", e);
        }
    }
}
