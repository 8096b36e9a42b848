//! Category tree stored as an arena keyed by id with explicit parent links
//!
//! Every reparent is checked with a bounded ancestor walk before anything is
//! written, so the tree can never contain a cycle.

use indexmap::IndexMap;
use tracing::warn;
use uuid::Uuid;

use super::types::{Category, CategoryId};
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: IndexMap<CategoryId, Category>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from decrypted nodes, repairing anything that cannot be a tree
    ///
    /// Dangling parents and cyclic parent chains become roots.
    pub fn from_nodes(nodes: Vec<Category>) -> Self {
        let mut tree = Self {
            nodes: nodes.into_iter().map(|c| (c.id, c)).collect(),
        };

        let ids: Vec<CategoryId> = tree.nodes.keys().copied().collect();
        for id in ids {
            let parent = tree.nodes.get(&id).and_then(|c| c.parent);
            let Some(parent) = parent else { continue };

            let broken = !tree.nodes.contains_key(&parent) || tree.is_ancestor_or_self(id, parent);
            if broken {
                warn!("Category {} had an invalid parent, moved to root", id);
                if let Some(node) = tree.nodes.get_mut(&id) {
                    node.parent = None;
                }
            }
        }

        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    /// Direct children of `parent` (`None` lists the roots)
    pub fn children(&self, parent: Option<CategoryId>) -> impl Iterator<Item = &Category> {
        self.nodes.values().filter(move |c| c.parent == parent)
    }

    /// Names from the root down to `id`
    pub fn path(&self, id: CategoryId) -> Result<Vec<&str>> {
        let mut names = Vec::new();
        let mut current = Some(id);
        let mut steps = 0;

        while let Some(node_id) = current {
            let node = self
                .nodes
                .get(&node_id)
                .ok_or(VaultError::CategoryNotFound(node_id))?;
            names.push(node.name.as_str());
            current = node.parent;

            steps += 1;
            if steps > self.nodes.len() {
                return Err(VaultError::CycleDetected(id));
            }
        }

        names.reverse();
        Ok(names)
    }

    /// True if `ancestor` is `node` or lies on `node`'s parent chain
    ///
    /// The walk is bounded by the node count; a chain longer than that can
    /// only be a cycle and is reported as "related".
    pub fn is_ancestor_or_self(&self, ancestor: CategoryId, node: CategoryId) -> bool {
        let mut current = Some(node);
        let mut steps = 0;

        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return true;
            }
            current = self.nodes.get(&id).and_then(|c| c.parent);
        }

        false
    }

    pub fn add(&mut self, name: &str, parent: Option<CategoryId>) -> Result<CategoryId> {
        let name = validate_name(name)?;
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(VaultError::CategoryNotFound(parent));
            }
        }

        let id = Uuid::new_v4();
        self.nodes.insert(id, Category { id, name, parent });
        Ok(id)
    }

    pub fn rename(&mut self, id: CategoryId, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(VaultError::CategoryNotFound(id))?;
        node.name = name;
        Ok(())
    }

    /// Reparent `id` under `new_parent` (`None` makes it a root)
    ///
    /// Fails with `CycleDetected`, leaving the tree untouched, if
    /// `new_parent` is `id` itself or one of its descendants.
    pub fn move_to(&mut self, id: CategoryId, new_parent: Option<CategoryId>) -> Result<()> {
        if !self.contains(id) {
            return Err(VaultError::CategoryNotFound(id));
        }

        if let Some(parent) = new_parent {
            if !self.contains(parent) {
                return Err(VaultError::CategoryNotFound(parent));
            }
            if self.is_ancestor_or_self(id, parent) {
                return Err(VaultError::CycleDetected(id));
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = new_parent;
        }
        Ok(())
    }

    /// Remove a category; its children move up to its parent
    pub fn remove(&mut self, id: CategoryId) -> Result<Category> {
        let removed = self
            .nodes
            .shift_remove(&id)
            .ok_or(VaultError::CategoryNotFound(id))?;

        for node in self.nodes.values_mut() {
            if node.parent == Some(id) {
                node.parent = removed.parent;
            }
        }

        Ok(removed)
    }

    /// Nodes in insertion order, for serialization
    pub fn to_nodes(&self) -> Vec<Category> {
        self.nodes.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::Validation(
            "category name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Work > Clients > Acme, plus a separate Personal root
    fn sample() -> (CategoryTree, CategoryId, CategoryId, CategoryId, CategoryId) {
        let mut tree = CategoryTree::new();
        let work = tree.add("Work", None).unwrap();
        let clients = tree.add("Clients", Some(work)).unwrap();
        let acme = tree.add("Acme", Some(clients)).unwrap();
        let personal = tree.add("Personal", None).unwrap();
        (tree, work, clients, acme, personal)
    }

    #[test]
    fn test_path_and_children() {
        let (tree, work, clients, acme, personal) = sample();

        assert_eq!(tree.path(acme).unwrap(), vec!["Work", "Clients", "Acme"]);

        let roots: Vec<CategoryId> = tree.children(None).map(|c| c.id).collect();
        assert_eq!(roots, vec![work, personal]);

        let under_work: Vec<CategoryId> = tree.children(Some(work)).map(|c| c.id).collect();
        assert_eq!(under_work, vec![clients]);
    }

    #[test]
    fn test_move_to_descendant_is_rejected_and_tree_unchanged() {
        let (mut tree, work, _clients, acme, _personal) = sample();
        let before = tree.to_nodes();

        let result = tree.move_to(work, Some(acme));
        assert!(matches!(result, Err(VaultError::CycleDetected(id)) if id == work));
        assert_eq!(tree.to_nodes(), before);
    }

    #[test]
    fn test_move_to_self_is_rejected() {
        let (mut tree, work, ..) = sample();
        assert!(matches!(
            tree.move_to(work, Some(work)),
            Err(VaultError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_valid_moves() {
        let (mut tree, work, clients, acme, personal) = sample();

        tree.move_to(acme, Some(personal)).unwrap();
        assert_eq!(tree.path(acme).unwrap(), vec!["Personal", "Acme"]);

        tree.move_to(clients, None).unwrap();
        assert_eq!(tree.get(clients).unwrap().parent, None);

        // Moving a former ancestor below a former descendant is fine now.
        tree.move_to(work, Some(clients)).unwrap();
        assert_eq!(tree.path(work).unwrap(), vec!["Clients", "Work"]);
    }

    #[test]
    fn test_remove_lifts_children() {
        let (mut tree, work, clients, acme, _) = sample();

        tree.remove(clients).unwrap();
        assert_eq!(tree.get(acme).unwrap().parent, Some(work));
        assert!(!tree.contains(clients));
        assert!(matches!(
            tree.remove(clients),
            Err(VaultError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn test_add_validation() {
        let mut tree = CategoryTree::new();
        assert!(matches!(tree.add("   ", None), Err(VaultError::Validation(_))));
        assert!(matches!(
            tree.add("Orphan", Some(Uuid::new_v4())),
            Err(VaultError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn test_from_nodes_breaks_cycles_and_dangling_parents() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let nodes = vec![
            Category { id: a, name: "A".into(), parent: Some(b) },
            Category { id: b, name: "B".into(), parent: Some(a) },
            Category { id: c, name: "C".into(), parent: Some(Uuid::new_v4()) },
        ];

        let tree = CategoryTree::from_nodes(nodes);

        assert_eq!(tree.get(a).unwrap().parent, None);
        assert_eq!(tree.get(b).unwrap().parent, Some(a));
        assert_eq!(tree.get(c).unwrap().parent, None);
        assert_eq!(tree.path(b).unwrap(), vec!["A", "B"]);
    }
}
