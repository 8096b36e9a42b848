//! Decrypted vault record definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SecretString;

pub type EntryId = Uuid;
pub type CategoryId = Uuid;

/// A superseded revision of an entry
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct EntryVersion {
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub url: Option<String>,
    pub notes: Option<String>,
    #[zeroize(skip)]
    pub category: Option<CategoryId>,
    /// When this revision was replaced
    #[zeroize(skip)]
    pub recorded_at: DateTime<Utc>,
}

impl std::fmt::Debug for EntryVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryVersion")
            .field("recorded_at", &self.recorded_at)
            .finish_non_exhaustive()
    }
}

/// Decrypted password entry - only exists while the vault is unlocked
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    #[zeroize(skip)]
    pub id: EntryId,
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub url: Option<String>,
    pub notes: Option<String>,
    #[zeroize(skip)]
    pub category: Option<CategoryId>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub updated_at: DateTime<Utc>,
    /// Prior revisions, oldest first
    #[serde(default)]
    pub history: Vec<EntryVersion>,
}

impl VaultEntry {
    /// Build a brand-new entry from a draft
    pub(crate) fn create(id: EntryId, draft: &EntryDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title.trim().to_string(),
            username: draft.username.clone(),
            password: draft.password.clone(),
            url: draft.url.clone(),
            notes: draft.notes.clone(),
            category: draft.category,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Current field values as a history record
    pub(crate) fn snapshot(&self, recorded_at: DateTime<Utc>) -> EntryVersion {
        EntryVersion {
            title: self.title.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            url: self.url.clone(),
            notes: self.notes.clone(),
            category: self.category,
            recorded_at,
        }
    }

    /// Replace the editable fields, pushing the old values onto `history`
    pub(crate) fn revise(&mut self, draft: &EntryDraft, now: DateTime<Utc>) {
        let prior = self.snapshot(now);
        self.history.push(prior);

        self.title = draft.title.trim().to_string();
        self.username = draft.username.clone();
        self.password = draft.password.clone();
        self.url = draft.url.clone();
        self.notes = draft.notes.clone();
        self.category = draft.category;
        self.updated_at = now;
    }

    /// Editable fields of this entry, ready to be modified and upserted
    pub fn to_draft(&self) -> EntryDraft {
        EntryDraft {
            id: Some(self.id),
            title: self.title.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            url: self.url.clone(),
            notes: self.notes.clone(),
            category: self.category,
        }
    }
}

impl std::fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("updated_at", &self.updated_at)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Non-secret view of an entry, safe to hand to list views
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: EntryId,
    pub title: String,
    pub username: String,
    pub url: Option<String>,
    pub category: Option<CategoryId>,
    pub updated_at: DateTime<Utc>,
}

impl From<&VaultEntry> for EntrySummary {
    fn from(entry: &VaultEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title.clone(),
            username: entry.username.clone(),
            url: entry.url.clone(),
            category: entry.category,
            updated_at: entry.updated_at,
        }
    }
}

/// Input for creating (`id: None`) or revising an entry
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct EntryDraft {
    #[zeroize(skip)]
    pub id: Option<EntryId>,
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub url: Option<String>,
    pub notes: Option<String>,
    #[zeroize(skip)]
    pub category: Option<CategoryId>,
}

impl EntryDraft {
    pub fn new(title: &str, username: &str, password: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            username: username.to_string(),
            password: SecretString::from(password),
            url: None,
            notes: None,
            category: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn in_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }
}

impl std::fmt::Debug for EntryDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryDraft")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Node of the category tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent: Option<CategoryId>,
}
