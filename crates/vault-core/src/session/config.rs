//! Session tuning knobs

use std::time::Duration;

use crate::crypto::{CipherAlgorithm, KdfAlgorithm, KdfPolicy};

/// Auto-lock used when none (or zero) is configured
pub const DEFAULT_AUTO_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Iterations for vaults created by this client
pub const DEFAULT_NEW_VAULT_ITERATIONS: u32 = 310_000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity after which an unlocked vault is locked
    pub auto_lock_timeout: Duration,
    /// How often the background monitor checks inactivity and token expiry
    pub check_interval: Duration,
    /// Upper bound on every call to the API collaborator
    pub network_timeout: Duration,
    pub kdf_policy: KdfPolicy,
    pub new_vault_kdf: KdfAlgorithm,
    pub new_vault_iterations: u32,
    pub cipher: CipherAlgorithm,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout: DEFAULT_AUTO_LOCK_TIMEOUT,
            check_interval: Duration::from_secs(5),
            network_timeout: Duration::from_secs(30),
            kdf_policy: KdfPolicy::default(),
            new_vault_kdf: KdfAlgorithm::Pbkdf2HmacSha256,
            new_vault_iterations: DEFAULT_NEW_VAULT_ITERATIONS,
            cipher: CipherAlgorithm::Aes256Gcm,
        }
    }
}

impl SessionConfig {
    /// Replace unusable values with defaults
    ///
    /// Auto-lock cannot be switched off: a zero timeout falls back to
    /// [`DEFAULT_AUTO_LOCK_TIMEOUT`].
    pub fn normalized(mut self) -> Self {
        if self.auto_lock_timeout.is_zero() {
            self.auto_lock_timeout = DEFAULT_AUTO_LOCK_TIMEOUT;
        }
        if self.check_interval.is_zero() {
            self.check_interval = Duration::from_secs(1);
        }
        if self.check_interval > self.auto_lock_timeout {
            self.check_interval = self.auto_lock_timeout;
        }
        if self.network_timeout.is_zero() {
            self.network_timeout = Duration::from_secs(30);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_auto_lock_uses_default() {
        let config = SessionConfig {
            auto_lock_timeout: Duration::ZERO,
            ..SessionConfig::default()
        }
        .normalized();

        assert_eq!(config.auto_lock_timeout, DEFAULT_AUTO_LOCK_TIMEOUT);
    }

    #[test]
    fn test_check_interval_never_exceeds_timeout() {
        let config = SessionConfig {
            auto_lock_timeout: Duration::from_secs(2),
            check_interval: Duration::from_secs(10),
            ..SessionConfig::default()
        }
        .normalized();

        assert_eq!(config.check_interval, Duration::from_secs(2));
    }
}
