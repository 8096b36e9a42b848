//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file.
//! Settings are readable before sign-in and never contain secrets.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::clipboard::DEFAULT_CLIPBOARD_TTL;
use crate::crypto::{CipherAlgorithm, KdfAlgorithm, KdfPolicy, SALT_LEN};
use crate::error::{Result, VaultError};
use crate::session::{SessionConfig, DEFAULT_AUTO_LOCK_TIMEOUT, DEFAULT_NEW_VAULT_ITERATIONS};

pub const ENV_API_URL: &str = "VAULT_API_URL";
pub const ENV_API_TIMEOUT: &str = "VAULT_API_TIMEOUT";
pub const ENV_AUTO_LOCK: &str = "VAULT_AUTO_LOCK_SECS";

/// Key derivation used when this client creates a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVaultKdf {
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
}

impl Default for NewVaultKdf {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2HmacSha256,
            iterations: DEFAULT_NEW_VAULT_ITERATIONS,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    pub api_base_url: String,
    pub api_timeout_secs: u64,
    /// Auto-lock timeout in seconds (0 = default, auto-lock cannot be disabled)
    pub auto_lock_timeout_secs: u64,
    pub auto_lock_check_interval_secs: u64,
    pub clipboard_ttl_secs: u64,
    pub min_pbkdf2_iterations: u32,
    pub min_argon2_time_cost: u32,
    pub min_argon2_memory_kib: u32,
    pub min_salt_len: usize,
    pub new_vault_kdf: NewVaultKdf,
    pub remember_email: bool,
    pub last_email: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = KdfPolicy::default();
        Self {
            version: 1,
            api_base_url: "http://localhost:5000".to_string(),
            api_timeout_secs: 30,
            auto_lock_timeout_secs: DEFAULT_AUTO_LOCK_TIMEOUT.as_secs(),
            auto_lock_check_interval_secs: 5,
            clipboard_ttl_secs: DEFAULT_CLIPBOARD_TTL.as_secs(),
            min_pbkdf2_iterations: policy.min_pbkdf2_iterations,
            min_argon2_time_cost: policy.min_argon2_time_cost,
            min_argon2_memory_kib: policy.min_argon2_memory_kib,
            min_salt_len: SALT_LEN,
            new_vault_kdf: NewVaultKdf::default(),
            remember_email: false,
            last_email: None,
        }
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `VAULT_*` environment overrides on top of the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_API_TIMEOUT) {
            match raw.trim().parse() {
                Ok(secs) => self.api_timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid {}={:?}", ENV_API_TIMEOUT, raw),
            }
        }
        if let Some(raw) = lookup(ENV_AUTO_LOCK) {
            match raw.trim().parse() {
                Ok(secs) => self.auto_lock_timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid {}={:?}", ENV_AUTO_LOCK, raw),
            }
        }
    }

    pub fn kdf_policy(&self) -> KdfPolicy {
        KdfPolicy {
            min_pbkdf2_iterations: self.min_pbkdf2_iterations,
            min_argon2_time_cost: self.min_argon2_time_cost,
            min_argon2_memory_kib: self.min_argon2_memory_kib,
            min_salt_len: self.min_salt_len,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            auto_lock_timeout: Duration::from_secs(self.auto_lock_timeout_secs),
            check_interval: Duration::from_secs(self.auto_lock_check_interval_secs),
            network_timeout: self.api_timeout(),
            kdf_policy: self.kdf_policy(),
            new_vault_kdf: self.new_vault_kdf.algorithm,
            new_vault_iterations: self.new_vault_kdf.iterations,
            cipher: CipherAlgorithm::Aes256Gcm,
        }
        .normalized()
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn clipboard_ttl(&self) -> Duration {
        match self.clipboard_ttl_secs {
            0 => DEFAULT_CLIPBOARD_TTL,
            secs => Duration::from_secs(secs),
        }
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Create a new settings manager
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join("settings.json");
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Unreadable settings file, using defaults: {}", e);
            Settings::new()
        });

        Self {
            settings_file,
            settings,
        }
    }

    /// Settings manager for the platform data directory
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("org", "vault", "vault-client").ok_or_else(|| {
            VaultError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory for settings",
            ))
        })?;
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir)?;
        Ok(Self::new(dir))
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember (or forget) the account email for the next sign-in
    pub async fn remember_email(&mut self, email: Option<&str>) -> Result<()> {
        self.settings.remember_email = email.is_some();
        self.settings.last_email = email.map(str::to_string);
        self.save().await
    }
}
