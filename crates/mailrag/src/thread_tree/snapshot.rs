//! Serializable form of a thread tree
//!
//! A child is always linked at the moment it is added, so children lists are
//! rebuilt from node order and only the parent position is stored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::tree::Node;
use super::{ThreadTree, ThreadTreeError};
use crate::models::{MimeMessageId, ThreadId};

/// One node of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: MimeMessageId,
    /// Position of the parent in `ThreadTreeSnapshot::nodes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    #[serde(default)]
    pub deleted: bool,
}

/// Persistable description of a [`ThreadTree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTreeSnapshot {
    pub thread_id: ThreadId,
    /// Nodes in insertion order
    pub nodes: Vec<SnapshotNode>,
    /// Tombstoned ids that were never added as nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphan_tombstones: Vec<MimeMessageId>,
}

impl ThreadTreeSnapshot {
    /// Number of tombstoned nodes
    pub fn deleted_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.deleted).count()
    }
}

impl ThreadTree {
    /// Capture the full state of the tree
    pub fn snapshot(&self) -> ThreadTreeSnapshot {
        ThreadTreeSnapshot {
            thread_id: self.thread_id.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|n| SnapshotNode {
                    id: n.id.clone(),
                    parent: n.parent,
                    deleted: n.deleted,
                })
                .collect(),
            orphan_tombstones: self.orphan_tombstones.iter().cloned().collect(),
        }
    }

    /// Rebuild a tree from a snapshot, validating it
    ///
    /// Parents must precede their children, ids must be unique, and an orphan
    /// tombstone may not name a node.
    pub fn from_snapshot(snapshot: ThreadTreeSnapshot) -> Result<Self, ThreadTreeError> {
        let mut nodes: Vec<Node> = Vec::with_capacity(snapshot.nodes.len());
        let mut index = HashMap::with_capacity(snapshot.nodes.len());

        for (position, node) in snapshot.nodes.into_iter().enumerate() {
            if let Some(parent) = node.parent
                && parent >= position
            {
                return Err(ThreadTreeError::InvalidSnapshot(format!(
                    "node {} at position {} references parent position {}",
                    node.id, position, parent
                )));
            }

            if index.insert(node.id.clone(), position).is_some() {
                return Err(ThreadTreeError::InvalidSnapshot(format!(
                    "node {} appears more than once",
                    node.id
                )));
            }

            if let Some(parent) = node.parent {
                nodes[parent].children.push(position);
            }

            nodes.push(Node {
                id: node.id,
                parent: node.parent,
                children: Vec::new(),
                deleted: node.deleted,
            });
        }

        let mut orphan_tombstones = BTreeSet::new();
        for id in snapshot.orphan_tombstones {
            if index.contains_key(&id) {
                return Err(ThreadTreeError::InvalidSnapshot(format!(
                    "orphan tombstone {} is also a node",
                    id
                )));
            }
            orphan_tombstones.insert(id);
        }

        Ok(Self {
            thread_id: snapshot.thread_id,
            nodes,
            index,
            orphan_tombstones,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> MimeMessageId {
        MimeMessageId::new(s)
    }

    fn sample_tree() -> ThreadTree {
        let mut tree = ThreadTree::new(ThreadId::new("t1"));
        tree.add(id("A"));
        tree.add_and_try_link(id("B"), Some(&id("A"))).unwrap();
        tree.add_and_try_link(id("C"), Some(&id("A"))).unwrap();
        tree.add_and_try_link(id("D"), Some(&id("B"))).unwrap();
        tree.add(id("R"));
        tree.mark_deleted(&id("C"));
        tree.mark_deleted(&id("never-seen"));
        tree
    }

    #[test]
    fn test_snapshot_restores_structure() {
        let tree = sample_tree();
        let restored = ThreadTree::from_snapshot(tree.snapshot()).unwrap();

        assert_eq!(restored.thread_id(), &ThreadId::new("t1"));
        assert_eq!(
            restored.nodes().collect::<Vec<_>>(),
            tree.nodes().collect::<Vec<_>>()
        );
        assert_eq!(restored.children_of(&id("A")), vec![&id("B"), &id("C")]);
        assert_eq!(restored.branches(), tree.branches());
        assert!(restored.is_marked_deleted(&id("C")));
        assert!(restored.is_branch_deleted(&id("C")));
        assert!(restored.is_marked_deleted(&id("never-seen")));
        assert!(!restored.is_marked_deleted(&id("A")));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = sample_tree().snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: ThreadTreeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.deleted_count(), 1);

        // Roots carry no parent field
        assert!(json.contains(r#"{"id":"A","deleted":false}"#));
    }

    #[test]
    fn test_snapshot_rejects_forward_parent() {
        let snapshot = ThreadTreeSnapshot {
            thread_id: ThreadId::new("t1"),
            nodes: vec![
                SnapshotNode {
                    id: id("A"),
                    parent: Some(1),
                    deleted: false,
                },
                SnapshotNode {
                    id: id("B"),
                    parent: None,
                    deleted: false,
                },
            ],
            orphan_tombstones: Vec::new(),
        };
        assert!(matches!(
            ThreadTree::from_snapshot(snapshot),
            Err(ThreadTreeError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_snapshot_rejects_duplicates() {
        let node = SnapshotNode {
            id: id("A"),
            parent: None,
            deleted: false,
        };
        let snapshot = ThreadTreeSnapshot {
            thread_id: ThreadId::new("t1"),
            nodes: vec![node.clone(), node],
            orphan_tombstones: Vec::new(),
        };
        assert!(ThreadTree::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_snapshot_rejects_orphan_that_is_a_node() {
        let snapshot = ThreadTreeSnapshot {
            thread_id: ThreadId::new("t1"),
            nodes: vec![SnapshotNode {
                id: id("A"),
                parent: None,
                deleted: true,
            }],
            orphan_tombstones: vec![id("A")],
        };
        assert!(ThreadTree::from_snapshot(snapshot).is_err());
    }
}
