//! # vault-core
//!
//! Client-side engine of the password manager:
//! - PBKDF2 / Argon2id key derivation and AEAD blob encryption
//! - In-memory decrypted vault with categories, history and search
//! - Session state machine owning the key, with auto-lock and token refresh
//! - Time-boxed clipboard exposure of secrets

pub mod api;
pub mod clipboard;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod session;
pub mod settings;
pub mod strength;
pub mod vault;

#[cfg(test)]
mod testing;

pub use api::{Credentials, TokenGrant, VaultApi};
pub use clipboard::{ClipboardBackend, ClipboardGuard, MemoryClipboard, DEFAULT_CLIPBOARD_TTL};
pub use crypto::{
    decrypt, encrypt, generate_salt, BlobKind, CipherAlgorithm, CipherEngine, EncryptedBlob,
    KdfAlgorithm, KdfPolicy, KeyDerivation, MasterKey, SecretString, VaultParams,
};
pub use error::{Result, VaultError};
pub use generator::{generate_password, GeneratorOptions};
pub use session::{
    LockHook, SessionConfig, SessionController, SessionState, StateChange, TransitionReason,
    UnlockReport,
};
pub use settings::{NewVaultKdf, Settings, SettingsManager};
pub use strength::{PasswordScorer, StrengthScore};
pub use vault::{
    Category, CategoryId, CategoryTree, EntryDraft, EntryId, EntrySummary, EntryVersion,
    LoadFailure, PartialLoadResult, Search, SearchQuery, VaultEntry, VaultStore,
};
