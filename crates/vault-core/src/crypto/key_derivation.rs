//! Password-based key derivation (PBKDF2-HMAC-SHA256 or Argon2id)
//!
//! Parameters normally come from the server, so every call is checked against
//! a local [`KdfPolicy`] before any work is done. A server that hands out
//! cheap parameters gets `WeakParameters`, not a weak key.

use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::{MasterKey, KEY_LEN};
use crate::error::{Result, VaultError};

/// Length of salts generated for new vaults
pub const SALT_LEN: usize = 16;

/// Key stretching algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum KdfAlgorithm {
    #[serde(rename = "pbkdf2-hmac-sha256")]
    Pbkdf2HmacSha256,
    /// Argon2id; `iterations` is used as the time cost
    #[serde(rename = "argon2id", rename_all = "camelCase")]
    Argon2id { memory_kib: u32, lanes: u32 },
}

impl std::fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KdfAlgorithm::Pbkdf2HmacSha256 => write!(f, "pbkdf2-hmac-sha256"),
            KdfAlgorithm::Argon2id { memory_kib, lanes } => {
                write!(f, "argon2id(m={}KiB,p={})", memory_kib, lanes)
            }
        }
    }
}

/// Everything needed to re-derive a vault key, as published by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultParams {
    #[serde(with = "super::serde_b64")]
    pub salt: Vec<u8>,
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
}

impl VaultParams {
    /// Fresh parameters for a new vault with a random salt
    pub fn generate(algorithm: KdfAlgorithm, iterations: u32) -> Self {
        Self {
            salt: generate_salt(),
            algorithm,
            iterations,
        }
    }
}

/// Minimum acceptable derivation cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfPolicy {
    pub min_pbkdf2_iterations: u32,
    pub min_argon2_time_cost: u32,
    pub min_argon2_memory_kib: u32,
    pub min_salt_len: usize,
}

impl Default for KdfPolicy {
    fn default() -> Self {
        Self {
            min_pbkdf2_iterations: 100_000,
            min_argon2_time_cost: 2,
            min_argon2_memory_kib: 19_456,
            min_salt_len: SALT_LEN,
        }
    }
}

/// Policy-checked key derivation
#[derive(Debug, Clone, Default)]
pub struct KeyDerivation {
    policy: KdfPolicy,
}

impl KeyDerivation {
    pub fn new(policy: KdfPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &KdfPolicy {
        &self.policy
    }

    /// Reject malformed or too-cheap parameters without deriving anything
    pub fn validate(&self, salt: &[u8], iterations: u32, algorithm: KdfAlgorithm) -> Result<()> {
        if salt.is_empty() {
            return Err(VaultError::InvalidParameters("salt is empty".to_string()));
        }
        if salt.len() < self.policy.min_salt_len {
            return Err(VaultError::InvalidParameters(format!(
                "salt is {} bytes, minimum is {}",
                salt.len(),
                self.policy.min_salt_len
            )));
        }
        if iterations == 0 {
            return Err(VaultError::InvalidParameters(
                "iteration count must be positive".to_string(),
            ));
        }

        match algorithm {
            KdfAlgorithm::Pbkdf2HmacSha256 => {
                if iterations < self.policy.min_pbkdf2_iterations {
                    return Err(VaultError::WeakParameters(format!(
                        "{} PBKDF2 iterations, minimum is {}",
                        iterations, self.policy.min_pbkdf2_iterations
                    )));
                }
            }
            KdfAlgorithm::Argon2id { memory_kib, lanes } => {
                if lanes == 0 || memory_kib < 8 * lanes {
                    return Err(VaultError::InvalidParameters(format!(
                        "argon2id needs at least 8 KiB per lane (m={}, p={})",
                        memory_kib, lanes
                    )));
                }
                if iterations < self.policy.min_argon2_time_cost {
                    return Err(VaultError::WeakParameters(format!(
                        "argon2id time cost {}, minimum is {}",
                        iterations, self.policy.min_argon2_time_cost
                    )));
                }
                if memory_kib < self.policy.min_argon2_memory_kib {
                    return Err(VaultError::WeakParameters(format!(
                        "argon2id memory {} KiB, minimum is {}",
                        memory_kib, self.policy.min_argon2_memory_kib
                    )));
                }
            }
        }

        Ok(())
    }

    /// Derive a 256-bit vault key
    ///
    /// Deterministic for identical inputs. On any failure the partially
    /// written output buffer is dropped (and therefore zeroed) before the
    /// error is returned.
    pub fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        algorithm: KdfAlgorithm,
    ) -> Result<MasterKey> {
        self.validate(salt, iterations, algorithm)?;

        let mut key = MasterKey::zeroed();

        match algorithm {
            KdfAlgorithm::Pbkdf2HmacSha256 => {
                pbkdf2_hmac::<Sha256>(password, salt, iterations, key.bytes_mut());
            }
            KdfAlgorithm::Argon2id { memory_kib, lanes } => {
                let params = Params::new(memory_kib, iterations, lanes, Some(KEY_LEN))
                    .map_err(|e| VaultError::InvalidParameters(e.to_string()))?;
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                    .hash_password_into(password, salt, key.bytes_mut())
                    .map_err(|e| VaultError::InvalidParameters(e.to_string()))?;
            }
        }

        debug!("Derived vault key using {} ({} iterations)", algorithm, iterations);
        Ok(key)
    }

    /// Derive using server-published parameters
    pub fn derive_with(&self, password: &[u8], params: &VaultParams) -> Result<MasterKey> {
        self.derive(password, &params.salt, params.iterations, params.algorithm)
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KeyDerivation {
        KeyDerivation::new(KdfPolicy {
            min_pbkdf2_iterations: 1_000,
            min_argon2_time_cost: 1,
            min_argon2_memory_kib: 64,
            min_salt_len: 16,
        })
    }

    #[test]
    fn test_generate_salt() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();

        assert_eq!(salt1.len(), SALT_LEN);
        assert_ne!(salt1, salt2);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let kdf = cheap();
        let salt = generate_salt();

        let key1 = kdf
            .derive(b"correct horse", &salt, 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();
        let key2 = kdf
            .derive(b"correct horse", &salt, 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_pbkdf2_known_answer() {
        // RFC 7914 section 11 PBKDF2-HMAC-SHA256 vector, truncated to 32 bytes.
        let kdf = KeyDerivation::new(KdfPolicy {
            min_pbkdf2_iterations: 1,
            min_salt_len: 4,
            ..KdfPolicy::default()
        });
        let key = kdf
            .derive(b"passwd", b"salt", 1, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();

        let expected: [u8; 32] = [
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc,
        ];
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_derive_key_different_salts() {
        let kdf = cheap();

        let key1 = kdf
            .derive(b"pw", &generate_salt(), 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();
        let key2 = kdf
            .derive(b"pw", &generate_salt(), 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_passwords() {
        let kdf = cheap();
        let salt = generate_salt();

        let key1 = kdf
            .derive(b"password1", &salt, 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();
        let key2 = kdf
            .derive(b"password2", &salt, 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_argon2id_derivation() {
        let kdf = cheap();
        let salt = generate_salt();
        let algorithm = KdfAlgorithm::Argon2id {
            memory_kib: 64,
            lanes: 1,
        };

        let key1 = kdf.derive(b"pw", &salt, 1, algorithm).unwrap();
        let key2 = kdf.derive(b"pw", &salt, 1, algorithm).unwrap();
        let pbkdf = kdf
            .derive(b"pw", &salt, 1_000, KdfAlgorithm::Pbkdf2HmacSha256)
            .unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
        assert_ne!(key1.as_bytes(), pbkdf.as_bytes());
    }

    #[test]
    fn test_low_iterations_rejected_as_weak() {
        let kdf = KeyDerivation::default();
        let result = kdf.derive(b"pw", &generate_salt(), 1_000, KdfAlgorithm::Pbkdf2HmacSha256);
        assert!(matches!(result, Err(VaultError::WeakParameters(_))));

        let result = kdf.derive(
            b"pw",
            &generate_salt(),
            3,
            KdfAlgorithm::Argon2id {
                memory_kib: 1024,
                lanes: 1,
            },
        );
        assert!(matches!(result, Err(VaultError::WeakParameters(_))));
    }

    #[test]
    fn test_malformed_parameters_rejected() {
        let kdf = cheap();

        let empty = kdf.derive(b"pw", &[], 1_000, KdfAlgorithm::Pbkdf2HmacSha256);
        assert!(matches!(empty, Err(VaultError::InvalidParameters(_))));

        let short = kdf.derive(b"pw", &[1, 2, 3], 1_000, KdfAlgorithm::Pbkdf2HmacSha256);
        assert!(matches!(short, Err(VaultError::InvalidParameters(_))));

        let zero = kdf.derive(b"pw", &generate_salt(), 0, KdfAlgorithm::Pbkdf2HmacSha256);
        assert!(matches!(zero, Err(VaultError::InvalidParameters(_))));

        let no_lanes = kdf.derive(
            b"pw",
            &generate_salt(),
            1,
            KdfAlgorithm::Argon2id {
                memory_kib: 64,
                lanes: 0,
            },
        );
        assert!(matches!(no_lanes, Err(VaultError::InvalidParameters(_))));
    }

    #[test]
    fn test_vault_params_json_shape() {
        let params = VaultParams {
            salt: vec![0u8; 16],
            algorithm: KdfAlgorithm::Pbkdf2HmacSha256,
            iterations: 100_000,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["salt"], "AAAAAAAAAAAAAAAAAAAAAA==");
        assert_eq!(json["algorithm"]["name"], "pbkdf2-hmac-sha256");

        let back: VaultParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
