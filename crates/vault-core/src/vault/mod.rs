//! Decrypted vault contents: entries, categories and search

mod category;
mod search;
mod store;
mod types;

pub use category::CategoryTree;
pub use search::{Search, SearchQuery};
pub use store::{LoadFailure, PartialLoadResult, VaultStore};
pub use types::*;
