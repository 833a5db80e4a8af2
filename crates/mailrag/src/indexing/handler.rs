//! Keeps the reply index in step with mailbox events
//!
//! Each message becomes one document holding only its extracted reply. A
//! deletion tombstones the message in its thread tree; documents are purged
//! only once every message on the branch is gone, so the remaining replies
//! of a live conversation keep their context.

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;

use super::{DocumentSink, IndexDocument};
use crate::mapper::MessageIdMapper;
use crate::models::{FetchedMessage, MessageId, MimeMessageId, ThreadId};
use crate::reply::ReplyExtractor;
use crate::storage::ThreadStore;
use crate::thread_tree::ThreadTree;

/// A mapping points at a thread whose tree is not stored
///
/// The index and the tree store disagree; the caller should rebuild the
/// thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message {message_id} maps to thread {thread_id}, which has no stored tree")]
pub struct MissingThreadTreeError {
    pub thread_id: ThreadId,
    pub message_id: MessageId,
}

/// What happened to an added message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// No usable `Message-ID`; nothing was stored
    Skipped,
    /// The node already exists in its thread tree
    Duplicate,
    /// Added to the tree, but it was deleted before it arrived and its whole
    /// branch is gone, so nothing was indexed
    AlreadyDeleted,
    /// Added and indexed; `linked` tells whether it was attached to a parent
    Indexed { linked: bool },
}

/// Applies mailbox events to thread trees and the document sink
pub struct ReplyIndexHandler {
    store: Arc<dyn ThreadStore>,
    mapper: MessageIdMapper,
    extractor: Box<dyn ReplyExtractor>,
    sink: Arc<dyn DocumentSink>,
}

impl ReplyIndexHandler {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        extractor: Box<dyn ReplyExtractor>,
        sink: Arc<dyn DocumentSink>,
    ) -> Self {
        Self {
            mapper: MessageIdMapper::new(store.clone()),
            store,
            extractor,
            sink,
        }
    }

    /// Handle a newly arrived message
    pub fn on_message_added(&self, message: &FetchedMessage) -> Result<AddOutcome> {
        let Some(mime_message_id) = message.mime_message_id() else {
            warn!(
                "[INDEX] Skipping message {} in thread {}: missing or unparseable Message-ID",
                message.message_id, message.thread_id
            );
            return Ok(AddOutcome::Skipped);
        };

        let mut tree = self
            .store
            .load_tree(&message.thread_id)?
            .unwrap_or_else(|| ThreadTree::new(message.thread_id.clone()));

        if tree.contains(&mime_message_id) {
            info!(
                "[INDEX] Message {} ({}) already in thread {}",
                message.message_id, mime_message_id, message.thread_id
            );
            return Ok(AddOutcome::Duplicate);
        }

        let parent = message.in_reply_to();
        let linked = tree.add_and_try_link(mime_message_id.clone(), parent.as_ref())?;
        if !linked && let Some(parent) = &parent {
            debug!(
                "[INDEX] Could not link {} under {} in thread {}, added as root",
                mime_message_id, parent, message.thread_id
            );
        }

        self.store.save_tree(&tree)?;
        self.mapper.record(message)?;

        if tree.is_branch_deleted(&mime_message_id) {
            info!(
                "[INDEX] Message {} ({}) was deleted before it arrived, not indexing",
                message.message_id, mime_message_id
            );
            return Ok(AddOutcome::AlreadyDeleted);
        }

        self.index(message, mime_message_id)?;

        Ok(AddOutcome::Indexed { linked })
    }

    /// Handle a message removed from the mailbox
    ///
    /// Returns the node IDs whose documents were purged: the whole branch when
    /// this deletion left it without live messages, otherwise nothing.
    pub fn on_message_deleted(&self, message_id: &MessageId) -> Result<Vec<MimeMessageId>> {
        let Some(mapping) = self.mapper.resolve(message_id)? else {
            warn!("[INDEX] Deleted message {} was never indexed", message_id);
            return Ok(Vec::new());
        };

        let Some(mut tree) = self.store.load_tree(&mapping.thread_id)? else {
            return Err(MissingThreadTreeError {
                thread_id: mapping.thread_id,
                message_id: message_id.clone(),
            }
            .into());
        };

        tree.mark_deleted(&mapping.mime_message_id);
        self.store.save_tree(&tree)?;

        let purged = if tree.is_branch_deleted(&mapping.mime_message_id) {
            tree.branch_of(&mapping.mime_message_id)
        } else {
            Vec::new()
        };

        for id in &purged {
            self.sink
                .delete(&mapping.thread_id, &IndexDocument::document_id_for(id))?;
        }

        // Forget last so a failed purge can be retried
        self.mapper.forget(message_id)?;

        if purged.is_empty() {
            info!(
                "[INDEX] Tombstoned {} in thread {}, branch still live",
                mapping.mime_message_id, mapping.thread_id
            );
        } else {
            info!(
                "[INDEX] Branch of {} in thread {} fully deleted, purged {} documents",
                mapping.mime_message_id,
                mapping.thread_id,
                purged.len()
            );
        }

        Ok(purged)
    }

    /// Rebuild a thread from the full list of its messages
    ///
    /// Tombstones of the previously stored tree are carried over. Messages on
    /// fully deleted branches have their documents removed; all others are
    /// (re)indexed.
    pub fn rebuild_thread(
        &self,
        thread_id: &ThreadId,
        messages: &[FetchedMessage],
    ) -> Result<ThreadTree> {
        let messages: Vec<FetchedMessage> = messages
            .iter()
            .filter(|m| {
                let belongs = &m.thread_id == thread_id;
                if !belongs {
                    warn!(
                        "[INDEX] Message {} belongs to thread {}, not {}; skipping",
                        m.message_id, m.thread_id, thread_id
                    );
                }
                belongs
            })
            .cloned()
            .collect();

        let mut tree = ThreadTree::from_messages(thread_id.clone(), &messages)?;

        if let Some(previous) = self.store.load_tree(thread_id)? {
            let snapshot = previous.snapshot();
            let tombstones = snapshot
                .nodes
                .iter()
                .filter(|n| n.deleted)
                .map(|n| &n.id)
                .chain(snapshot.orphan_tombstones.iter());
            for id in tombstones {
                tree.mark_deleted(id);
            }
        }

        self.store.save_tree(&tree)?;

        let mut indexed = 0;
        for message in &messages {
            let Some(mime_message_id) = message.mime_message_id() else {
                continue;
            };

            self.mapper.record(message)?;

            if tree.is_branch_deleted(&mime_message_id) {
                self.sink
                    .delete(thread_id, &IndexDocument::document_id_for(&mime_message_id))?;
            } else {
                self.index(message, mime_message_id)?;
                indexed += 1;
            }
        }

        info!(
            "[INDEX] Rebuilt thread {}: {} nodes, {} branches, {} documents indexed",
            thread_id,
            tree.len(),
            tree.branch_starts().len(),
            indexed
        );

        Ok(tree)
    }

    fn index(&self, message: &FetchedMessage, mime_message_id: MimeMessageId) -> Result<()> {
        let content = self
            .extractor
            .extract_reply(message.body_text.as_deref().unwrap_or_default());

        self.sink.upsert(IndexDocument {
            document_id: IndexDocument::document_id_for(&mime_message_id),
            thread_id: message.thread_id.clone(),
            message_id: message.message_id.clone(),
            mime_message_id,
            subject: message.subject.clone(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::InMemoryDocumentSink;
    use crate::reply::ExtractionStrategy;
    use crate::storage::InMemoryThreadStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: Arc<InMemoryThreadStore>,
        sink: Arc<InMemoryDocumentSink>,
        handler: ReplyIndexHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryThreadStore::new());
        let sink = Arc::new(InMemoryDocumentSink::new());
        let handler = ReplyIndexHandler::new(
            store.clone(),
            ExtractionStrategy::Fragments.extractor(),
            sink.clone(),
        );
        Fixture {
            store,
            sink,
            handler,
        }
    }

    fn message(n: i64, id: &str, parent: Option<&str>, body: &str) -> FetchedMessage {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut builder = FetchedMessage::builder(MessageId::new(format!("m{}", n)), t1())
            .mime_message_id(id)
            .subject("Plans")
            .internal_date(base + Duration::minutes(n))
            .body_text(Some(body.to_string()));
        if let Some(parent) = parent {
            builder = builder.in_reply_to(parent);
        }
        builder.build()
    }

    fn t1() -> ThreadId {
        ThreadId::new("t1")
    }

    #[test]
    fn test_add_indexes_reply_only() {
        let f = fixture();
        let outcome = f
            .handler
            .on_message_added(&message(1, "a@x", None, "Hello all"))
            .unwrap();
        assert_eq!(outcome, AddOutcome::Indexed { linked: false });

        let outcome = f
            .handler
            .on_message_added(&message(
                2,
                "b@x",
                Some("a@x"),
                "Sounds good\n\nOn Mon, Jan 1, 2024, A wrote:\n> Hello all",
            ))
            .unwrap();
        assert_eq!(outcome, AddOutcome::Indexed { linked: true });

        let doc = f.sink.get(&t1(), "b@x").unwrap();
        assert_eq!(doc.content, "Sounds good");
        assert_eq!(doc.message_id, MessageId::new("m2"));
        assert_eq!(f.store.count_trees().unwrap(), 1);
    }

    #[test]
    fn test_add_skips_missing_message_id() {
        let f = fixture();
        let message = FetchedMessage::builder(MessageId::new("m1"), t1())
            .body_text(Some("text".to_string()))
            .build();

        assert_eq!(f.handler.on_message_added(&message).unwrap(), AddOutcome::Skipped);
        assert!(f.sink.is_empty());
        assert!(!f.store.has_tree(&t1()).unwrap());
    }

    #[test]
    fn test_add_duplicate() {
        let f = fixture();
        let m = message(1, "a@x", None, "Hi");
        f.handler.on_message_added(&m).unwrap();
        assert_eq!(f.handler.on_message_added(&m).unwrap(), AddOutcome::Duplicate);
    }

    #[test]
    fn test_delete_purges_only_fully_deleted_branch() {
        let f = fixture();
        f.handler.on_message_added(&message(1, "a@x", None, "A")).unwrap();
        f.handler
            .on_message_added(&message(2, "b@x", Some("a@x"), "B"))
            .unwrap();
        f.handler
            .on_message_added(&message(3, "c@x", Some("a@x"), "C"))
            .unwrap();

        // c@x is a second child, so it is its own branch
        let purged = f.handler.on_message_deleted(&MessageId::new("m3")).unwrap();
        assert_eq!(purged, vec![MimeMessageId::new("c@x")]);
        assert!(f.sink.get(&t1(), "c@x").is_none());

        // a@x -> b@x still has b@x alive
        let purged = f.handler.on_message_deleted(&MessageId::new("m1")).unwrap();
        assert!(purged.is_empty());
        assert!(f.sink.get(&t1(), "a@x").is_some());

        let purged = f.handler.on_message_deleted(&MessageId::new("m2")).unwrap();
        assert_eq!(
            purged,
            vec![MimeMessageId::new("a@x"), MimeMessageId::new("b@x")]
        );
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_delete_unknown_message() {
        let f = fixture();
        assert!(
            f.handler
                .on_message_deleted(&MessageId::new("nope"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_delete_with_missing_tree() {
        let f = fixture();
        f.handler.on_message_added(&message(1, "a@x", None, "A")).unwrap();
        f.store.delete_tree(&t1()).unwrap();

        let err = f.handler.on_message_deleted(&MessageId::new("m1")).unwrap_err();
        let missing = err.downcast_ref::<MissingThreadTreeError>().unwrap();
        assert_eq!(missing.thread_id, t1());
    }

    #[test]
    fn test_rebuild_keeps_tombstones() {
        let f = fixture();
        let messages = vec![
            message(1, "a@x", None, "A"),
            message(2, "b@x", Some("a@x"), "B"),
            message(3, "c@x", Some("a@x"), "C"),
        ];
        for m in &messages {
            f.handler.on_message_added(m).unwrap();
        }
        f.handler.on_message_deleted(&MessageId::new("m3")).unwrap();

        let tree = f.handler.rebuild_thread(&t1(), &messages).unwrap();
        assert!(tree.is_marked_deleted(&MimeMessageId::new("c@x")));
        assert!(f.sink.get(&t1(), "c@x").is_none());
        assert_eq!(f.sink.documents_for_thread(&t1()).len(), 2);
    }

    #[test]
    fn test_deleted_before_arrival() {
        let f = fixture();
        f.handler.on_message_added(&message(1, "a@x", None, "A")).unwrap();

        // Tombstone for a node that has not arrived yet
        let mut tree = f.store.load_tree(&t1()).unwrap().unwrap();
        tree.mark_deleted(&MimeMessageId::new("late@x"));
        f.store.save_tree(&tree).unwrap();

        let outcome = f
            .handler
            .on_message_added(&message(5, "late@x", None, "late"))
            .unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyDeleted);
        assert!(f.sink.get(&t1(), "late@x").is_none());
    }
}
