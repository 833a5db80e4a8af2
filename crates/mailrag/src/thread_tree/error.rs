//! Thread tree errors

use crate::models::MimeMessageId;

/// Errors raised when a thread tree operation would break its invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadTreeError {
    /// The message is already a node of the tree
    #[error("message {0} is already part of the thread tree")]
    DuplicateNode(MimeMessageId),

    /// The message is not a node of the tree
    #[error("message {0} is not part of the thread tree")]
    UnknownNode(MimeMessageId),

    /// The child already has a parent; re-parenting is not supported
    #[error("message {child} is already linked to parent {parent}")]
    AlreadyLinked {
        child: MimeMessageId,
        parent: MimeMessageId,
    },

    /// Linking would make a message its own ancestor
    #[error("linking {child} under {parent} would create a cycle")]
    Cycle {
        child: MimeMessageId,
        parent: MimeMessageId,
    },

    /// A persisted snapshot does not describe a valid tree
    #[error("invalid thread tree snapshot: {0}")]
    InvalidSnapshot(String),
}
