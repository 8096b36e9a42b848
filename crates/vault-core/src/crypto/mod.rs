//! Cryptographic primitives for the vault
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 / Argon2id key derivation with a minimum-cost policy
//! - AES-256-GCM / ChaCha20-Poly1305 blob encryption
//! - Secure memory handling with zeroize

mod encryption;
mod key_derivation;
mod secure_memory;
mod serde_b64;

pub use encryption::{
    decrypt, encrypt, BlobKind, CipherAlgorithm, CipherEngine, EncryptedBlob, BLOB_VERSION,
    NONCE_LEN, TAG_LEN,
};
pub use key_derivation::{
    generate_salt, KdfAlgorithm, KdfPolicy, KeyDerivation, VaultParams, SALT_LEN,
};
pub use secure_memory::{MasterKey, SecretString, KEY_LEN};
