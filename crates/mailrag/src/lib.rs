//! Mailrag crate - Reply tracking for email retrieval indexes
//!
//! This crate provides the pieces needed to index only what each email
//! newly says, and to drop it again once a conversation branch is gone:
//! - Domain models (FetchedMessage, MessageId, MimeMessageId, ThreadId)
//! - Thread trees with branch and tombstone tracking
//! - Reply extraction (quoted history and signature removal)
//! - Storage trait abstractions with in-memory and SQLite backends
//! - MIME normalization of raw messages
//! - An indexing handler reacting to added and deleted messages
//!
//! This crate has no UI or network dependencies.

pub mod config;
pub mod indexing;
pub mod mapper;
pub mod models;
pub mod normalize;
pub mod reply;
pub mod storage;
pub mod thread_tree;

pub use crate::config::RagConfig;
pub use indexing::{
    AddOutcome, DocumentSink, InMemoryDocumentSink, IndexDocument, MissingThreadTreeError,
    ReplyIndexHandler,
};
pub use mapper::MessageIdMapper;
pub use models::{FetchedMessage, Header, MessageId, MimeMessageId, ThreadId};
pub use normalize::{date_header, html_to_text, normalize_message};
pub use reply::{
    EmailMessage, EmailParser, ExtractionStrategy, FragmentExtractor, LinePatternExtractor,
    ReplyExtractor, extract_reply,
};
pub use storage::{InMemoryThreadStore, MessageMapping, SqliteThreadStore, ThreadStore};
pub use thread_tree::{SnapshotNode, ThreadTree, ThreadTreeError, ThreadTreeSnapshot};
