//! # vault-http
//!
//! REST client for the password manager server. Implements
//! [`vault_core::VaultApi`] over reqwest; tokens travel only in the
//! `Authorization` header and are never logged.

mod client;
mod error;
mod wire;

pub use client::HttpVaultApi;
pub use error::HttpError;
