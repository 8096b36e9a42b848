//! Authenticated encryption of vault blobs (AES-256-GCM or ChaCha20-Poly1305)
//!
//! Blob wire format (JSON, byte fields base64):
//! `{id, kind, version, algorithm, nonce, ciphertext}` where `ciphertext`
//! carries the 16-byte tag appended by the AEAD. The header fields are fed
//! to the AEAD as associated data.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::MasterKey;
use crate::error::{Result, VaultError};

/// Current blob format version
pub const BLOB_VERSION: u16 = 1;

/// Nonce length shared by both supported AEADs (96 bits)
pub const NONCE_LEN: usize = 12;

/// Authentication tag length shared by both supported AEADs
pub const TAG_LEN: usize = 16;

/// AEAD used for a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    fn tag(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "aes-256-gcm",
            CipherAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

/// What a blob contains once decrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    Entry,
    Categories,
    Verification,
}

impl BlobKind {
    fn tag(self) -> &'static str {
        match self {
            BlobKind::Entry => "entry",
            BlobKind::Categories => "categories",
            BlobKind::Verification => "verification",
        }
    }
}

/// Opaque encrypted record exchanged with the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub id: Uuid,
    pub kind: BlobKind,
    pub version: u16,
    pub algorithm: CipherAlgorithm,
    #[serde(with = "super::serde_b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "super::serde_b64")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    fn associated_data(&self) -> Vec<u8> {
        associated_data(self.id, self.kind, self.version, self.algorithm)
    }
}

fn associated_data(id: Uuid, kind: BlobKind, version: u16, algorithm: CipherAlgorithm) -> Vec<u8> {
    format!("v{}:{}:{}:{}", version, algorithm.tag(), kind.tag(), id).into_bytes()
}

/// Encrypts and decrypts blobs with a borrowed vault key
#[derive(Debug, Clone, Copy)]
pub struct CipherEngine {
    algorithm: CipherAlgorithm,
}

impl Default for CipherEngine {
    fn default() -> Self {
        Self {
            algorithm: CipherAlgorithm::Aes256Gcm,
        }
    }
}

impl CipherEngine {
    /// Engine that seals new blobs with `algorithm`
    pub fn new(algorithm: CipherAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` into a new blob
    ///
    /// The nonce is always drawn here from the OS RNG; callers cannot supply
    /// one.
    pub fn encrypt(
        &self,
        id: Uuid,
        kind: BlobKind,
        plaintext: &[u8],
        key: &MasterKey,
    ) -> Result<EncryptedBlob> {
        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let aad = associated_data(id, kind, BLOB_VERSION, self.algorithm);
        let payload = Payload {
            msg: plaintext,
            aad: &aad,
        };

        let ciphertext = match self.algorithm {
            CipherAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| VaultError::InvalidParameters(e.to_string()))?
                .encrypt(nonce, payload),
            CipherAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| VaultError::InvalidParameters(e.to_string()))?
                .encrypt(nonce, payload),
        }
        .map_err(|_| VaultError::InvalidParameters("plaintext too large".to_string()))?;

        Ok(EncryptedBlob {
            id,
            kind,
            version: BLOB_VERSION,
            algorithm: self.algorithm,
            nonce: iv.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt a blob
    ///
    /// The procedure is chosen solely by the blob's `version` and
    /// `algorithm`; nothing is retried with another algorithm. Tag
    /// verification inside both AEAD crates is constant time.
    pub fn decrypt(&self, blob: &EncryptedBlob, key: &MasterKey) -> Result<Zeroizing<Vec<u8>>> {
        if blob.version != BLOB_VERSION {
            return Err(VaultError::UnsupportedBlob(format!(
                "version {} (expected {})",
                blob.version, BLOB_VERSION
            )));
        }
        if blob.nonce.len() != NONCE_LEN {
            return Err(VaultError::UnsupportedBlob(format!(
                "nonce length {} (expected {})",
                blob.nonce.len(),
                NONCE_LEN
            )));
        }
        if blob.ciphertext.len() < TAG_LEN {
            return Err(VaultError::AuthFailure);
        }

        let aad = blob.associated_data();
        let payload = Payload {
            msg: &blob.ciphertext,
            aad: &aad,
        };
        let nonce = Nonce::from_slice(&blob.nonce);

        let plaintext = match blob.algorithm {
            CipherAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| VaultError::InvalidParameters(e.to_string()))?
                .decrypt(nonce, payload),
            CipherAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| VaultError::InvalidParameters(e.to_string()))?
                .decrypt(nonce, payload),
        }
        .map_err(|_| VaultError::AuthFailure)?;

        Ok(Zeroizing::new(plaintext))
    }
}

/// Encrypt with the default engine (AES-256-GCM)
pub fn encrypt(id: Uuid, kind: BlobKind, plaintext: &[u8], key: &MasterKey) -> Result<EncryptedBlob> {
    CipherEngine::default().encrypt(id, kind, plaintext, key)
}

/// Decrypt any supported blob
pub fn decrypt(blob: &EncryptedBlob, key: &MasterKey) -> Result<Zeroizing<Vec<u8>>> {
    CipherEngine::default().decrypt(blob, key)
}
