//! Reply forest for a single conversation
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index.
//! Nothing is ever removed: deleting a message only tombstones its node.

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

use super::ThreadTreeError;
use crate::models::{FetchedMessage, MimeMessageId, ThreadId};

#[derive(Debug, Clone)]
pub(super) struct Node {
    pub(super) id: MimeMessageId,
    pub(super) parent: Option<usize>,
    /// Direct children in link order (chronological)
    pub(super) children: Vec<usize>,
    pub(super) deleted: bool,
}

/// Parent/child reply relationships between the messages of one thread
///
/// A node without a parent is a root. The first child of a node is its
/// leftmost child. A branch runs from a branch start (a root, or a child that
/// is not the leftmost one) down through leftmost children to a leaf.
///
/// The tree is not synchronized: one owner mutates it at a time.
#[derive(Debug, Clone)]
pub struct ThreadTree {
    pub(super) thread_id: ThreadId,
    pub(super) nodes: Vec<Node>,
    pub(super) index: HashMap<MimeMessageId, usize>,
    /// Tombstones recorded for ids that were never added
    pub(super) orphan_tombstones: BTreeSet<MimeMessageId>,
}

impl ThreadTree {
    /// Create an empty tree for a thread
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            nodes: Vec::new(),
            index: HashMap::new(),
            orphan_tombstones: BTreeSet::new(),
        }
    }

    /// Build a tree from a batch of already-fetched messages
    ///
    /// Messages are visited by ascending internal date so that a parent is
    /// always inserted before its replies. Messages without a usable
    /// `Message-ID` are skipped. A reply whose parent is not in the batch
    /// becomes a root.
    ///
    /// Fails with [`ThreadTreeError::DuplicateNode`] if two messages share a
    /// `Message-ID`.
    pub fn from_messages(
        thread_id: ThreadId,
        messages: &[FetchedMessage],
    ) -> Result<Self, ThreadTreeError> {
        let mut ordered: Vec<&FetchedMessage> = messages.iter().collect();
        ordered.sort_by_key(|m| m.internal_date);

        let mut tree = Self::new(thread_id);

        for message in ordered {
            let Some(id) = message.mime_message_id() else {
                warn!(
                    "[THREAD] Skipping message {} in thread {}: missing or unparseable Message-ID",
                    message.message_id, tree.thread_id
                );
                continue;
            };

            if !tree.add(id.clone()) {
                return Err(ThreadTreeError::DuplicateNode(id));
            }

            match message.in_reply_to() {
                Some(parent) if parent != id && tree.contains(&parent) => {
                    tree.link(&parent, &id)?;
                }
                Some(parent) => {
                    debug!(
                        "[THREAD] Parent {} of {} not found in thread {}, adding as root",
                        parent, id, tree.thread_id
                    );
                }
                None => {}
            }
        }

        Ok(tree)
    }

    /// Thread this tree describes
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Number of nodes ever added
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the id has been added as a node
    pub fn contains(&self, id: &MimeMessageId) -> bool {
        self.index.contains_key(id)
    }

    /// All node ids in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &MimeMessageId> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Insert a new node with no parent and no children
    ///
    /// Returns false (and changes nothing) if the node already exists.
    pub fn add(&mut self, id: MimeMessageId) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }

        // A tombstone recorded before the node existed still applies
        let deleted = self.orphan_tombstones.remove(&id);

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node {
            id,
            parent: None,
            children: Vec::new(),
            deleted,
        });
        true
    }

    /// Add a new node and link it under `parent` when possible
    ///
    /// The link is made only if the parent exists and is not tombstoned.
    /// Returns whether the link was made. The child must be new.
    pub fn add_and_try_link(
        &mut self,
        child: MimeMessageId,
        parent: Option<&MimeMessageId>,
    ) -> Result<bool, ThreadTreeError> {
        if !self.add(child.clone()) {
            return Err(ThreadTreeError::DuplicateNode(child));
        }

        let Some(parent) = parent else {
            return Ok(false);
        };

        if parent == &child || !self.contains(parent) || self.is_marked_deleted(parent) {
            return Ok(false);
        }

        self.link(parent, &child)?;
        Ok(true)
    }

    /// Record `parent` as the parent of `child`, appending to its children
    fn link(
        &mut self,
        parent: &MimeMessageId,
        child: &MimeMessageId,
    ) -> Result<(), ThreadTreeError> {
        let parent_idx = self.position(parent)?;
        let child_idx = self.position(child)?;

        if let Some(existing) = self.nodes[child_idx].parent {
            return Err(ThreadTreeError::AlreadyLinked {
                child: child.clone(),
                parent: self.nodes[existing].id.clone(),
            });
        }

        // The child must not be the parent or one of its ancestors
        let mut cursor = Some(parent_idx);
        while let Some(idx) = cursor {
            if idx == child_idx {
                return Err(ThreadTreeError::Cycle {
                    child: child.clone(),
                    parent: parent.clone(),
                });
            }
            cursor = self.nodes[idx].parent;
        }

        self.nodes[child_idx].parent = Some(parent_idx);
        self.nodes[parent_idx].children.push(child_idx);
        Ok(())
    }

    /// Tombstone a message
    ///
    /// Returns true if it was not tombstoned before. Unknown ids are accepted
    /// and remembered in case the node is added later.
    pub fn mark_deleted(&mut self, id: &MimeMessageId) -> bool {
        match self.index.get(id) {
            Some(&idx) => {
                let node = &mut self.nodes[idx];
                if node.deleted {
                    false
                } else {
                    node.deleted = true;
                    true
                }
            }
            None => self.orphan_tombstones.insert(id.clone()),
        }
    }

    pub fn is_marked_deleted(&self, id: &MimeMessageId) -> bool {
        match self.index.get(id) {
            Some(&idx) => self.nodes[idx].deleted,
            None => self.orphan_tombstones.contains(id),
        }
    }

    /// Number of tombstoned nodes (orphan tombstones not included)
    pub fn deleted_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.deleted).count()
    }

    pub fn parent_of(&self, id: &MimeMessageId) -> Option<&MimeMessageId> {
        let idx = *self.index.get(id)?;
        self.nodes[idx].parent.map(|p| &self.nodes[p].id)
    }

    /// Direct children in chronological link order (empty for unknown ids)
    pub fn children_of(&self, id: &MimeMessageId) -> Vec<&MimeMessageId> {
        match self.index.get(id) {
            Some(&idx) => self.nodes[idx]
                .children
                .iter()
                .map(|&c| &self.nodes[c].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Nodes without a parent, in insertion order
    pub fn roots(&self) -> Vec<&MimeMessageId> {
        self.nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| &n.id)
            .collect()
    }

    /// Nodes that start a branch, in insertion order
    pub fn branch_starts(&self) -> Vec<&MimeMessageId> {
        (0..self.nodes.len())
            .filter(|&idx| self.is_branch_start(idx))
            .map(|idx| &self.nodes[idx].id)
            .collect()
    }

    /// The branch containing `id`, top to bottom, tombstoned nodes included
    ///
    /// Empty if the id is not a node of the tree.
    pub fn branch_of(&self, id: &MimeMessageId) -> Vec<MimeMessageId> {
        match self.index.get(id) {
            Some(&idx) => self
                .branch_indices(idx)
                .into_iter()
                .map(|i| self.nodes[i].id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every branch of the forest, ordered by branch start insertion
    pub fn branches(&self) -> Vec<Vec<MimeMessageId>> {
        (0..self.nodes.len())
            .filter(|&idx| self.is_branch_start(idx))
            .map(|start| {
                self.walk_down(start)
                    .into_iter()
                    .map(|i| self.nodes[i].id.clone())
                    .collect()
            })
            .collect()
    }

    /// Whether every node on the branch of `id` is tombstoned
    ///
    /// False for ids that are not nodes of the tree.
    pub fn is_branch_deleted(&self, id: &MimeMessageId) -> bool {
        match self.index.get(id) {
            Some(&idx) => self
                .branch_indices(idx)
                .into_iter()
                .all(|i| self.nodes[i].deleted),
            None => false,
        }
    }

    fn position(&self, id: &MimeMessageId) -> Result<usize, ThreadTreeError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ThreadTreeError::UnknownNode(id.clone()))
    }

    fn is_branch_start(&self, idx: usize) -> bool {
        match self.nodes[idx].parent {
            None => true,
            Some(parent) => self.nodes[parent].children.first() != Some(&idx),
        }
    }

    fn branch_indices(&self, idx: usize) -> Vec<usize> {
        let mut start = idx;
        while !self.is_branch_start(start) {
            // Not a branch start, so a parent exists
            match self.nodes[start].parent {
                Some(parent) => start = parent,
                None => break,
            }
        }
        self.walk_down(start)
    }

    fn walk_down(&self, start: usize) -> Vec<usize> {
        let mut path = vec![start];
        let mut current = start;
        while let Some(&first) = self.nodes[current].children.first() {
            path.push(first);
            current = first;
        }
        path
    }
}
