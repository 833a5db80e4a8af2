//! In-memory storage implementation
//!
//! Used for testing and for short-lived tools that do not need durability.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{MessageMapping, ThreadStore};
use crate::models::{MessageId, ThreadId};
use crate::thread_tree::{ThreadTree, ThreadTreeSnapshot};

/// In-memory implementation of ThreadStore
///
/// Holds snapshots rather than live trees, so a loaded tree is always an
/// independent copy owned by the caller.
pub struct InMemoryThreadStore {
    trees: RwLock<HashMap<ThreadId, ThreadTreeSnapshot>>,
    mappings: RwLock<HashMap<MessageId, MessageMapping>>,
}

impl InMemoryThreadStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            trees: RwLock::new(HashMap::new()),
            mappings: RwLock::new(HashMap::new()),
        }
    }

    /// Store a raw snapshot without validating it
    ///
    /// Lets tests simulate corrupted persisted state.
    pub fn insert_snapshot(&self, snapshot: ThreadTreeSnapshot) {
        let mut trees = self.trees.write().unwrap();
        trees.insert(snapshot.thread_id.clone(), snapshot);
    }
}

impl Default for InMemoryThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadStore for InMemoryThreadStore {
    fn save_tree(&self, tree: &ThreadTree) -> Result<()> {
        let snapshot = tree.snapshot();
        let mut trees = self.trees.write().unwrap();
        trees.insert(snapshot.thread_id.clone(), snapshot);
        Ok(())
    }

    fn load_tree(&self, thread_id: &ThreadId) -> Result<Option<ThreadTree>> {
        let snapshot = {
            let trees = self.trees.read().unwrap();
            trees.get(thread_id).cloned()
        };

        match snapshot {
            Some(snapshot) => Ok(Some(ThreadTree::from_snapshot(snapshot)?)),
            None => Ok(None),
        }
    }

    fn has_tree(&self, thread_id: &ThreadId) -> Result<bool> {
        let trees = self.trees.read().unwrap();
        Ok(trees.contains_key(thread_id))
    }

    fn delete_tree(&self, thread_id: &ThreadId) -> Result<()> {
        let mut trees = self.trees.write().unwrap();
        trees.remove(thread_id);
        Ok(())
    }

    fn list_tree_ids(&self) -> Result<Vec<ThreadId>> {
        let trees = self.trees.read().unwrap();
        let mut ids: Vec<ThreadId> = trees.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn count_trees(&self) -> Result<usize> {
        let trees = self.trees.read().unwrap();
        Ok(trees.len())
    }

    fn put_mapping(&self, mapping: MessageMapping) -> Result<()> {
        let mut mappings = self.mappings.write().unwrap();
        mappings.insert(mapping.message_id.clone(), mapping);
        Ok(())
    }

    fn get_mapping(&self, message_id: &MessageId) -> Result<Option<MessageMapping>> {
        let mappings = self.mappings.read().unwrap();
        Ok(mappings.get(message_id).cloned())
    }

    fn remove_mapping(&self, message_id: &MessageId) -> Result<()> {
        let mut mappings = self.mappings.write().unwrap();
        mappings.remove(message_id);
        Ok(())
    }

    fn list_mappings_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<MessageMapping>> {
        let mappings = self.mappings.read().unwrap();
        let mut result: Vec<MessageMapping> = mappings
            .values()
            .filter(|m| &m.thread_id == thread_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        Ok(result)
    }

    fn clear(&self) -> Result<()> {
        self.trees.write().unwrap().clear();
        self.mappings.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MimeMessageId;
    use crate::thread_tree::{SnapshotNode, ThreadTreeError};

    fn make_tree(thread: &str) -> ThreadTree {
        let mut tree = ThreadTree::new(ThreadId::new(thread));
        tree.add(MimeMessageId::new("a@x"));
        tree.add_and_try_link(MimeMessageId::new("b@x"), Some(&MimeMessageId::new("a@x")))
            .unwrap();
        tree
    }

    #[test]
    fn test_tree_round_trip() {
        let store = InMemoryThreadStore::new();
        let mut tree = make_tree("t1");
        tree.mark_deleted(&MimeMessageId::new("b@x"));
        store.save_tree(&tree).unwrap();

        let loaded = store.load_tree(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(loaded.branches(), tree.branches());
        assert!(loaded.is_marked_deleted(&MimeMessageId::new("b@x")));
        assert!(store.has_tree(&ThreadId::new("t1")).unwrap());
        assert_eq!(store.count_trees().unwrap(), 1);
    }

    #[test]
    fn test_load_missing_tree() {
        let store = InMemoryThreadStore::new();
        assert!(store.load_tree(&ThreadId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_loaded_tree_is_independent_copy() {
        let store = InMemoryThreadStore::new();
        store.save_tree(&make_tree("t1")).unwrap();

        let mut loaded = store.load_tree(&ThreadId::new("t1")).unwrap().unwrap();
        loaded.add(MimeMessageId::new("c@x"));

        let again = store.load_tree(&ThreadId::new("t1")).unwrap().unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_corrupted_snapshot_is_reported() {
        let store = InMemoryThreadStore::new();
        store.insert_snapshot(ThreadTreeSnapshot {
            thread_id: ThreadId::new("bad"),
            nodes: vec![SnapshotNode {
                id: MimeMessageId::new("a@x"),
                parent: Some(0),
                deleted: false,
            }],
            orphan_tombstones: Vec::new(),
        });

        let err = store.load_tree(&ThreadId::new("bad")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ThreadTreeError>(),
            Some(ThreadTreeError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_mappings() {
        let store = InMemoryThreadStore::new();
        store
            .put_mapping(MessageMapping::new(
                MessageId::new("2"),
                ThreadId::new("t1"),
                MimeMessageId::new("b@x"),
            ))
            .unwrap();
        store
            .put_mapping(MessageMapping::new(
                MessageId::new("1"),
                ThreadId::new("t1"),
                MimeMessageId::new("a@x"),
            ))
            .unwrap();
        store
            .put_mapping(MessageMapping::new(
                MessageId::new("9"),
                ThreadId::new("t2"),
                MimeMessageId::new("z@x"),
            ))
            .unwrap();

        let mapping = store.get_mapping(&MessageId::new("1")).unwrap().unwrap();
        assert_eq!(mapping.mime_message_id, MimeMessageId::new("a@x"));

        let in_t1 = store.list_mappings_for_thread(&ThreadId::new("t1")).unwrap();
        assert_eq!(in_t1.len(), 2);
        assert_eq!(in_t1[0].message_id, MessageId::new("1"));

        store.remove_mapping(&MessageId::new("1")).unwrap();
        assert!(store.get_mapping(&MessageId::new("1")).unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let store = InMemoryThreadStore::new();
        store.save_tree(&make_tree("t1")).unwrap();
        store.save_tree(&make_tree("t2")).unwrap();
        assert_eq!(
            store.list_tree_ids().unwrap(),
            vec![ThreadId::new("t1"), ThreadId::new("t2")]
        );

        store.clear().unwrap();
        assert_eq!(store.count_trees().unwrap(), 0);
    }
}
