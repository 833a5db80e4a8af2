//! Destination for extracted reply documents

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::models::{MessageId, MimeMessageId, ThreadId};

/// A reply ready to be embedded and indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Stable document key (the `Message-ID` of the message)
    pub document_id: String,
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    pub mime_message_id: MimeMessageId,
    pub subject: String,
    /// Extracted reply text
    pub content: String,
}

impl IndexDocument {
    /// Document key for a tree node
    pub fn document_id_for(mime_message_id: &MimeMessageId) -> String {
        mime_message_id.as_str().to_string()
    }
}

/// Receives documents to index and document deletions
pub trait DocumentSink: Send + Sync {
    /// Insert or replace a document
    fn upsert(&self, document: IndexDocument) -> Result<()>;

    /// Remove a document (no-op if absent)
    fn delete(&self, thread_id: &ThreadId, document_id: &str) -> Result<()>;
}

/// Sink that keeps documents in memory
///
/// Backs tests and the command-line tool.
pub struct InMemoryDocumentSink {
    documents: RwLock<BTreeMap<(ThreadId, String), IndexDocument>>,
}

impl InMemoryDocumentSink {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Look up a document
    pub fn get(&self, thread_id: &ThreadId, document_id: &str) -> Option<IndexDocument> {
        let documents = self.documents.read().unwrap();
        documents
            .get(&(thread_id.clone(), document_id.to_string()))
            .cloned()
    }

    /// All documents of a thread, ordered by document ID
    pub fn documents_for_thread(&self, thread_id: &ThreadId) -> Vec<IndexDocument> {
        let documents = self.documents.read().unwrap();
        documents
            .iter()
            .filter(|((t, _), _)| t == thread_id)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDocumentSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSink for InMemoryDocumentSink {
    fn upsert(&self, document: IndexDocument) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        documents.insert(
            (document.thread_id.clone(), document.document_id.clone()),
            document,
        );
        Ok(())
    }

    fn delete(&self, thread_id: &ThreadId, document_id: &str) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        documents.remove(&(thread_id.clone(), document_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(thread: &str, id: &str) -> IndexDocument {
        IndexDocument {
            document_id: id.to_string(),
            thread_id: ThreadId::new(thread),
            message_id: MessageId::new("1"),
            mime_message_id: MimeMessageId::new(id),
            subject: "s".to_string(),
            content: "c".to_string(),
        }
    }

    #[test]
    fn test_upsert_replaces() {
        let sink = InMemoryDocumentSink::new();
        sink.upsert(doc("t1", "a@x")).unwrap();
        let mut updated = doc("t1", "a@x");
        updated.content = "new".to_string();
        sink.upsert(updated).unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get(&ThreadId::new("t1"), "a@x").unwrap().content, "new");
    }

    #[test]
    fn test_delete_is_scoped_to_thread() {
        let sink = InMemoryDocumentSink::new();
        sink.upsert(doc("t1", "a@x")).unwrap();
        sink.upsert(doc("t2", "a@x")).unwrap();

        sink.delete(&ThreadId::new("t1"), "a@x").unwrap();
        sink.delete(&ThreadId::new("t1"), "missing").unwrap();

        assert!(sink.get(&ThreadId::new("t1"), "a@x").is_none());
        assert_eq!(sink.documents_for_thread(&ThreadId::new("t2")).len(), 1);
    }
}
