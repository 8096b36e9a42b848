//! System clipboard backend on top of arboard

use std::sync::Mutex;

use vault_core::{ClipboardBackend, Result, VaultError};

pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner = arboard::Clipboard::new().map_err(clipboard_error)?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn with<R>(
        &self,
        f: impl FnOnce(&mut arboard::Clipboard) -> std::result::Result<R, arboard::Error>,
    ) -> std::result::Result<R, arboard::Error> {
        let mut clipboard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut clipboard)
    }
}

impl ClipboardBackend for SystemClipboard {
    fn get_text(&self) -> Result<Option<String>> {
        match self.with(|c| c.get_text()) {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(clipboard_error(e)),
        }
    }

    fn set_text(&self, text: &str) -> Result<()> {
        self.with(|c| c.set_text(text)).map_err(clipboard_error)
    }

    fn clear(&self) -> Result<()> {
        self.with(|c| c.clear()).map_err(clipboard_error)
    }
}

fn clipboard_error(e: arboard::Error) -> VaultError {
    VaultError::Clipboard(e.to_string())
}
