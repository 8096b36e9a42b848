//! Lazy, restartable entry search

use indexmap::IndexMap;
use zeroize::Zeroizing;

use super::types::{CategoryId, EntryId, VaultEntry};

/// Text query plus optional category filter (both must match)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub category: Option<CategoryId>,
}

impl SearchQuery {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            category: None,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }
}

/// Iterator over entries matching a [`SearchQuery`]
///
/// Walks the store by index, so it never yields more items than the store
/// holds and [`Search::restart`] rewinds it without re-running anything.
#[derive(Clone)]
pub struct Search<'a> {
    entries: &'a IndexMap<EntryId, VaultEntry>,
    needle: Zeroizing<String>,
    category: Option<CategoryId>,
    position: usize,
}

impl<'a> Search<'a> {
    pub(crate) fn new(entries: &'a IndexMap<EntryId, VaultEntry>, query: &SearchQuery) -> Self {
        Self {
            entries,
            needle: Zeroizing::new(query.text.trim().to_lowercase()),
            category: query.category,
            position: 0,
        }
    }

    pub fn restart(&mut self) {
        self.position = 0;
    }

    fn matches(&self, entry: &VaultEntry) -> bool {
        if let Some(category) = self.category {
            if entry.category != Some(category) {
                return false;
            }
        }

        if self.needle.is_empty() {
            return true;
        }

        let fields = [
            Some(entry.title.as_str()),
            Some(entry.username.as_str()),
            entry.url.as_deref(),
            entry.notes.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|field| Zeroizing::new(field.to_lowercase()).contains(self.needle.as_str()))
    }
}

impl<'a> Iterator for Search<'a> {
    type Item = &'a VaultEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((_, entry)) = self.entries.get_index(self.position) {
            self.position += 1;
            if self.matches(entry) {
                return Some(entry);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len().saturating_sub(self.position)))
    }
}
