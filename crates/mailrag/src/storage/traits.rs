//! Storage trait definitions

use crate::models::{MessageId, MimeMessageId, ThreadId};
use crate::thread_tree::ThreadTree;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Where a mailbox message sits in the threading model
///
/// Mailbox events (expunges in particular) only carry the mailbox
/// [`MessageId`]; this mapping recovers the thread and tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMapping {
    pub message_id: MessageId,
    pub thread_id: ThreadId,
    pub mime_message_id: MimeMessageId,
}

impl MessageMapping {
    pub fn new(message_id: MessageId, thread_id: ThreadId, mime_message_id: MimeMessageId) -> Self {
        Self {
            message_id,
            thread_id,
            mime_message_id,
        }
    }
}

/// Trait for thread tree persistence
///
/// Trees are stored as snapshots keyed by thread ID. Outcomes of a load are
/// kept distinct:
/// - `Ok(None)`: no tree stored for that thread
/// - `Err(e)` where `e` downcasts to `ThreadTreeError::InvalidSnapshot`: the
///   stored data does not describe a valid tree
/// - any other `Err`: the backend failed
pub trait ThreadStore: Send + Sync {
    /// Insert or replace the tree of its thread
    fn save_tree(&self, tree: &ThreadTree) -> Result<()>;

    /// Load the tree of a thread
    fn load_tree(&self, thread_id: &ThreadId) -> Result<Option<ThreadTree>>;

    /// Check if a tree is stored for a thread
    fn has_tree(&self, thread_id: &ThreadId) -> Result<bool>;

    /// Delete the tree of a thread (mappings are left alone)
    fn delete_tree(&self, thread_id: &ThreadId) -> Result<()>;

    /// IDs of all stored trees, sorted
    fn list_tree_ids(&self) -> Result<Vec<ThreadId>>;

    /// Count stored trees
    fn count_trees(&self) -> Result<usize>;

    /// Insert or replace the mapping of a mailbox message
    fn put_mapping(&self, mapping: MessageMapping) -> Result<()>;

    /// Get the mapping of a mailbox message
    fn get_mapping(&self, message_id: &MessageId) -> Result<Option<MessageMapping>>;

    /// Remove the mapping of a mailbox message (no-op if absent)
    fn remove_mapping(&self, message_id: &MessageId) -> Result<()>;

    /// Mappings of all messages in a thread, sorted by message ID
    fn list_mappings_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<MessageMapping>>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
