//! In-memory decrypted vault
//!
//! The store owns every plaintext entry and the category tree. It never
//! holds the key: each operation that needs to (re-)encrypt borrows it from
//! the session controller for the duration of the call, and every mutation
//! hands back the blob(s) the caller must persist.

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::category::CategoryTree;
use super::search::{Search, SearchQuery};
use super::types::{Category, CategoryId, EntryDraft, EntryId, EntryVersion, VaultEntry};
use crate::crypto::{BlobKind, CipherEngine, EncryptedBlob, MasterKey};
use crate::error::{Result, VaultError};

/// A blob that could not be loaded, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub id: Uuid,
    pub kind: BlobKind,
    pub reason: String,
}

/// Outcome of [`VaultStore::load`]: everything that decrypted, plus the rest
#[derive(Debug)]
pub struct PartialLoadResult {
    pub store: VaultStore,
    pub failed: Vec<LoadFailure>,
}

impl PartialLoadResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct VaultStore {
    entries: IndexMap<EntryId, VaultEntry>,
    categories: CategoryTree,
    /// Server-side id of the encrypted category tree
    categories_blob_id: Uuid,
    cipher: CipherEngine,
}

impl VaultStore {
    /// Empty store for a freshly initialized vault
    pub fn new(cipher: CipherEngine) -> Self {
        Self {
            entries: IndexMap::new(),
            categories: CategoryTree::new(),
            categories_blob_id: Uuid::new_v4(),
            cipher,
        }
    }

    /// Decrypt every blob independently
    ///
    /// A blob that fails to decrypt or parse is skipped and reported in
    /// `failed`; it never aborts the rest of the load. Verification blobs are
    /// ignored here, the session controller checks them before loading.
    pub fn load(blobs: &[EncryptedBlob], key: &MasterKey, cipher: CipherEngine) -> PartialLoadResult {
        let mut store = Self::new(cipher);
        let mut failed = Vec::new();
        let mut tree_loaded = false;

        for blob in blobs {
            let outcome = match blob.kind {
                BlobKind::Verification => continue,
                BlobKind::Entry => store.load_entry(blob, key),
                BlobKind::Categories if tree_loaded => Err(VaultError::Validation(
                    "duplicate category tree".to_string(),
                )),
                BlobKind::Categories => store.load_categories(blob, key).map(|()| {
                    tree_loaded = true;
                }),
            };

            if let Err(e) = outcome {
                warn!("Skipping undecryptable {:?} blob {}: {}", blob.kind, blob.id, e);
                failed.push(LoadFailure {
                    id: blob.id,
                    kind: blob.kind,
                    reason: e.to_string(),
                });
            }
        }

        info!(
            "Loaded {} entries and {} categories ({} failed)",
            store.entries.len(),
            store.categories.len(),
            failed.len()
        );
        PartialLoadResult { store, failed }
    }

    fn load_entry(&mut self, blob: &EncryptedBlob, key: &MasterKey) -> Result<()> {
        let plaintext = self.cipher.decrypt(blob, key)?;
        let entry: VaultEntry = serde_json::from_slice(&plaintext)?;

        if entry.id != blob.id {
            return Err(VaultError::Validation(format!(
                "entry id {} does not match blob id",
                entry.id
            )));
        }
        if self.entries.contains_key(&entry.id) {
            return Err(VaultError::Validation("duplicate entry id".to_string()));
        }

        self.entries.insert(entry.id, entry);
        Ok(())
    }

    fn load_categories(&mut self, blob: &EncryptedBlob, key: &MasterKey) -> Result<()> {
        let plaintext = self.cipher.decrypt(blob, key)?;
        let nodes: Vec<Category> = serde_json::from_slice(&plaintext)?;

        self.categories = CategoryTree::from_nodes(nodes);
        self.categories_blob_id = blob.id;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&VaultEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &VaultEntry> {
        self.entries.values()
    }

    pub fn categories(&self) -> &CategoryTree {
        &self.categories
    }

    pub fn search(&self, query: &SearchQuery) -> Search<'_> {
        Search::new(&self.entries, query)
    }

    /// Create or revise an entry and return its re-encrypted blob
    ///
    /// Revisions push the previous values onto the entry's history and bump
    /// `updated_at`. The store is only modified once encryption succeeded.
    pub fn upsert(&mut self, draft: &EntryDraft, key: &MasterKey) -> Result<EncryptedBlob> {
        if draft.title.trim().is_empty() {
            return Err(VaultError::Validation("title must not be empty".to_string()));
        }
        if let Some(category) = draft.category {
            if !self.categories.contains(category) {
                return Err(VaultError::CategoryNotFound(category));
            }
        }

        let now = Utc::now();
        let entry = match draft.id {
            Some(id) => {
                let mut entry = self
                    .entries
                    .get(&id)
                    .cloned()
                    .ok_or(VaultError::EntryNotFound(id))?;
                entry.revise(draft, now);
                entry
            }
            None => VaultEntry::create(Uuid::new_v4(), draft, now),
        };

        let blob = self.seal_entry(&entry, key)?;
        debug!("Upserted entry {}", entry.id);
        self.entries.insert(entry.id, entry);
        Ok(blob)
    }

    /// Remove an entry from memory; persisting the deletion is the caller's job
    pub fn delete(&mut self, id: EntryId) -> Result<()> {
        self.entries
            .shift_remove(&id)
            .map(|_| debug!("Deleted entry {}", id))
            .ok_or(VaultError::EntryNotFound(id))
    }

    pub fn history(&self, id: EntryId) -> Result<&[EntryVersion]> {
        self.entries
            .get(&id)
            .map(|e| e.history.as_slice())
            .ok_or(VaultError::EntryNotFound(id))
    }

    /// Make history revision `index` current again (as a new revision)
    pub fn restore_version(
        &mut self,
        id: EntryId,
        index: usize,
        key: &MasterKey,
    ) -> Result<EncryptedBlob> {
        let version = self
            .history(id)?
            .get(index)
            .ok_or_else(|| VaultError::Validation(format!("entry has no revision {}", index)))?;

        let mut draft = EntryDraft::new(&version.title, &version.username, version.password.expose());
        draft.id = Some(id);
        draft.url = version.url.clone();
        draft.notes = version.notes.clone();
        draft.category = version
            .category
            .filter(|c| self.categories.contains(*c));

        self.upsert(&draft, key)
    }

    pub fn add_category(
        &mut self,
        name: &str,
        parent: Option<CategoryId>,
        key: &MasterKey,
    ) -> Result<(CategoryId, EncryptedBlob)> {
        let mut tree = self.categories.clone();
        let id = tree.add(name, parent)?;
        let blob = self.commit_tree(tree, key)?;
        Ok((id, blob))
    }

    pub fn rename_category(
        &mut self,
        id: CategoryId,
        name: &str,
        key: &MasterKey,
    ) -> Result<EncryptedBlob> {
        let mut tree = self.categories.clone();
        tree.rename(id, name)?;
        self.commit_tree(tree, key)
    }

    /// Reparent a category; `CycleDetected` leaves the tree unchanged
    pub fn move_category(
        &mut self,
        id: CategoryId,
        parent: Option<CategoryId>,
        key: &MasterKey,
    ) -> Result<EncryptedBlob> {
        let mut tree = self.categories.clone();
        tree.move_to(id, parent)?;
        self.commit_tree(tree, key)
    }

    /// Remove a category and uncategorize its entries
    ///
    /// Returns the tree blob followed by the blobs of every entry that lost
    /// its category.
    pub fn remove_category(&mut self, id: CategoryId, key: &MasterKey) -> Result<Vec<EncryptedBlob>> {
        let mut tree = self.categories.clone();
        tree.remove(id)?;

        let now = Utc::now();
        let mut touched = Vec::new();
        let mut blobs = vec![self.seal_tree(&tree, key)?];
        for entry in self.entries.values().filter(|e| e.category == Some(id)) {
            let mut entry = entry.clone();
            entry.category = None;
            entry.updated_at = now;
            blobs.push(self.seal_entry(&entry, key)?);
            touched.push(entry);
        }

        self.categories = tree;
        for entry in touched {
            self.entries.insert(entry.id, entry);
        }
        Ok(blobs)
    }

    /// Encrypted form of the current category tree
    pub fn encrypt_categories(&self, key: &MasterKey) -> Result<EncryptedBlob> {
        self.seal_tree(&self.categories, key)
    }

    /// Every entry plus the category tree, encrypted under `key`
    pub fn encrypt_all(&self, key: &MasterKey) -> Result<Vec<EncryptedBlob>> {
        let mut blobs = Vec::with_capacity(self.entries.len() + 1);
        blobs.push(self.encrypt_categories(key)?);
        for entry in self.entries.values() {
            blobs.push(self.seal_entry(entry, key)?);
        }
        Ok(blobs)
    }

    /// Drop all plaintext
    pub fn clear(&mut self) {
        self.entries.clear();
        self.categories.clear();
    }

    fn commit_tree(&mut self, tree: CategoryTree, key: &MasterKey) -> Result<EncryptedBlob> {
        let blob = self.seal_tree(&tree, key)?;
        self.categories = tree;
        Ok(blob)
    }

    fn seal_tree(&self, tree: &CategoryTree, key: &MasterKey) -> Result<EncryptedBlob> {
        let plaintext = Zeroizing::new(serde_json::to_vec(&tree.to_nodes())?);
        self.cipher
            .encrypt(self.categories_blob_id, BlobKind::Categories, &plaintext, key)
    }

    fn seal_entry(&self, entry: &VaultEntry, key: &MasterKey) -> Result<EncryptedBlob> {
        let plaintext = Zeroizing::new(serde_json::to_vec(entry)?);
        self.cipher.encrypt(entry.id, BlobKind::Entry, &plaintext, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> MasterKey {
        MasterKey::new([byte; 32])
    }

    fn store_with(drafts: &[EntryDraft], key: &MasterKey) -> (VaultStore, Vec<EncryptedBlob>) {
        let mut store = VaultStore::new(CipherEngine::default());
        let blobs = drafts
            .iter()
            .map(|d| store.upsert(d, key).unwrap())
            .collect();
        (store, blobs)
    }

    #[test]
    fn test_upsert_new_entry() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());

        let blob = store
            .upsert(&EntryDraft::new("GitHub", "octocat", "hunter2"), &key)
            .unwrap();

        let entry = store.get(blob.id).unwrap();
        assert_eq!(entry.title, "GitHub");
        assert_eq!(entry.password.expose(), "hunter2");
        assert_eq!(entry.created_at, entry.updated_at);
        assert!(entry.history.is_empty());
        assert_eq!(blob.kind, BlobKind::Entry);
    }

    #[test]
    fn test_upsert_requires_title() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());

        let result = store.upsert(&EntryDraft::new("  ", "user", "pw"), &key);
        assert!(matches!(result, Err(VaultError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_existing_records_history() {
        let key = key(1);
        let (mut store, blobs) = store_with(&[EntryDraft::new("Mail", "me", "old-pw")], &key);
        let id = blobs[0].id;
        let created = store.get(id).unwrap().updated_at;

        let mut draft = store.get(id).unwrap().to_draft();
        draft.password = "new-pw".into();
        store.upsert(&draft, &key).unwrap();

        let entry = store.get(id).unwrap();
        assert_eq!(entry.password.expose(), "new-pw");
        assert!(entry.updated_at >= created);
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].password.expose(), "old-pw");
    }

    #[test]
    fn test_upsert_unknown_id_or_category() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());

        let mut draft = EntryDraft::new("X", "", "");
        draft.id = Some(Uuid::new_v4());
        assert!(matches!(store.upsert(&draft, &key), Err(VaultError::EntryNotFound(_))));

        let draft = EntryDraft::new("X", "", "").in_category(Uuid::new_v4());
        assert!(matches!(
            store.upsert(&draft, &key),
            Err(VaultError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn test_restore_version() {
        let key = key(1);
        let (mut store, blobs) = store_with(&[EntryDraft::new("Bank", "me", "v1")], &key);
        let id = blobs[0].id;

        let mut draft = store.get(id).unwrap().to_draft();
        draft.password = "v2".into();
        store.upsert(&draft, &key).unwrap();

        store.restore_version(id, 0, &key).unwrap();
        let entry = store.get(id).unwrap();
        assert_eq!(entry.password.expose(), "v1");
        assert_eq!(entry.history.len(), 2);
        assert_eq!(entry.history[1].password.expose(), "v2");

        assert!(matches!(
            store.restore_version(id, 9, &key),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn test_load_roundtrip_with_categories() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());
        let (work, _) = store.add_category("Work", None, &key).unwrap();
        store
            .upsert(&EntryDraft::new("Jira", "dev", "pw").in_category(work), &key)
            .unwrap();
        store.upsert(&EntryDraft::new("Netflix", "me", "pw"), &key).unwrap();

        let blobs = store.encrypt_all(&key).unwrap();
        let loaded = VaultStore::load(&blobs, &key, CipherEngine::default());

        assert!(loaded.is_complete());
        assert_eq!(loaded.store.len(), 2);
        assert_eq!(loaded.store.categories().get(work).unwrap().name, "Work");
    }

    #[test]
    fn test_load_skips_corrupt_blob() {
        let key = key(1);
        let drafts: Vec<EntryDraft> = (0..5)
            .map(|i| EntryDraft::new(&format!("Entry {}", i), "u", "p"))
            .collect();
        let (_, mut blobs) = store_with(&drafts, &key);

        blobs[2].ciphertext[0] ^= 0xAA;
        let corrupt_id = blobs[2].id;

        let loaded = VaultStore::load(&blobs, &key, CipherEngine::default());
        assert_eq!(loaded.store.len(), 4);
        assert_eq!(loaded.failed.len(), 1);
        assert_eq!(loaded.failed[0].id, corrupt_id);
        assert!(loaded.store.get(corrupt_id).is_none());
    }

    #[test]
    fn test_load_with_wrong_key_fails_every_blob() {
        let (_, blobs) = store_with(&[EntryDraft::new("A", "", ""), EntryDraft::new("B", "", "")], &key(1));

        let loaded = VaultStore::load(&blobs, &key(2), CipherEngine::default());
        assert!(loaded.store.is_empty());
        assert_eq!(loaded.failed.len(), 2);
    }

    #[test]
    fn test_search_matches_fields_case_insensitively() {
        let key = key(1);
        let (store, _) = store_with(
            &[
                EntryDraft::new("GitHub", "octocat", "x").with_url("https://github.com"),
                EntryDraft::new("Mail", "Alice@Example.org", "x"),
                EntryDraft::new("Router", "admin", "x").with_notes("Closet shelf, HUB login"),
            ],
            &key,
        );

        let titles = |q: &str| -> Vec<String> {
            store.search(&SearchQuery::text(q)).map(|e| e.title.clone()).collect()
        };

        assert_eq!(titles("GITHUB"), vec!["GitHub"]);
        assert_eq!(titles("example"), vec!["Mail"]);
        assert_eq!(titles("hub"), vec!["GitHub", "Router"]);
        assert!(titles("nothing-here").is_empty());
        assert_eq!(titles("").len(), 3);
    }

    #[test]
    fn test_search_category_filter_is_conjunctive() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());
        let (work, _) = store.add_category("Work", None, &key).unwrap();
        store
            .upsert(&EntryDraft::new("Work mail", "me", "x").in_category(work), &key)
            .unwrap();
        store.upsert(&EntryDraft::new("Home mail", "me", "x"), &key).unwrap();
        store
            .upsert(&EntryDraft::new("Work VPN", "me", "x").in_category(work), &key)
            .unwrap();

        let hits: Vec<&str> = store
            .search(&SearchQuery::text("mail").in_category(work))
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(hits, vec!["Work mail"]);
    }

    #[test]
    fn test_search_is_restartable() {
        let key = key(1);
        let (store, _) = store_with(&[EntryDraft::new("A1", "", ""), EntryDraft::new("A2", "", "")], &key);

        let mut search = store.search(&SearchQuery::text("a"));
        assert_eq!(search.by_ref().count(), 2);
        assert!(search.next().is_none());

        search.restart();
        assert_eq!(search.count(), 2);
    }

    #[test]
    fn test_move_category_cycle_leaves_store_unchanged() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());
        let (root, _) = store.add_category("Root", None, &key).unwrap();
        let (child, _) = store.add_category("Child", Some(root), &key).unwrap();
        let before = store.categories().to_nodes();

        let result = store.move_category(root, Some(child), &key);
        assert!(matches!(result, Err(VaultError::CycleDetected(_))));
        assert_eq!(store.categories().to_nodes(), before);
    }

    #[test]
    fn test_remove_category_uncategorizes_entries() {
        let key = key(1);
        let mut store = VaultStore::new(CipherEngine::default());
        let (work, _) = store.add_category("Work", None, &key).unwrap();
        let blob = store
            .upsert(&EntryDraft::new("Jira", "dev", "pw").in_category(work), &key)
            .unwrap();

        let blobs = store.remove_category(work, &key).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].kind, BlobKind::Categories);
        assert_eq!(blobs[1].id, blob.id);
        assert_eq!(store.get(blob.id).unwrap().category, None);
    }

    #[test]
    fn test_delete_and_clear() {
        let key = key(1);
        let (mut store, blobs) = store_with(&[EntryDraft::new("A", "", ""), EntryDraft::new("B", "", "")], &key);

        store.delete(blobs[0].id).unwrap();
        assert!(matches!(store.delete(blobs[0].id), Err(VaultError::EntryNotFound(_))));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.search(&SearchQuery::all()).count(), 0);
    }
}
