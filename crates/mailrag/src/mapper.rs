//! Mailbox message ID to tree node mapping
//!
//! Expunge notifications only name the mailbox message, so the handler needs
//! a persistent way back to the thread and `Message-ID` it was indexed under.

use anyhow::Result;
use log::warn;
use std::sync::Arc;

use crate::models::{FetchedMessage, MessageId, MimeMessageId, ThreadId};
use crate::storage::{MessageMapping, ThreadStore};

/// Records and resolves [`MessageMapping`]s through a [`ThreadStore`]
#[derive(Clone)]
pub struct MessageIdMapper {
    store: Arc<dyn ThreadStore>,
}

impl MessageIdMapper {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self { store }
    }

    /// Record where a message lives
    ///
    /// Returns `None` without touching the store when the message has no
    /// usable `Message-ID`.
    pub fn record(&self, message: &FetchedMessage) -> Result<Option<MessageMapping>> {
        let Some(mime_message_id) = message.mime_message_id() else {
            warn!(
                "[MAPPER] Message {} has no usable Message-ID, not mapping it",
                message.message_id
            );
            return Ok(None);
        };

        let mapping = MessageMapping::new(
            message.message_id.clone(),
            message.thread_id.clone(),
            mime_message_id,
        );
        self.store.put_mapping(mapping.clone())?;
        Ok(Some(mapping))
    }

    /// Find where a message lives
    pub fn resolve(&self, message_id: &MessageId) -> Result<Option<MessageMapping>> {
        self.store.get_mapping(message_id)
    }

    /// Drop the mapping of a message
    pub fn forget(&self, message_id: &MessageId) -> Result<()> {
        self.store.remove_mapping(message_id)
    }

    /// Node IDs of every mapped message in a thread, in mailbox ID order
    pub fn mime_ids_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<MimeMessageId>> {
        Ok(self
            .store
            .list_mappings_for_thread(thread_id)?
            .into_iter()
            .map(|m| m.mime_message_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchedMessage, MESSAGE_ID_HEADER};
    use crate::storage::InMemoryThreadStore;

    fn mapper() -> MessageIdMapper {
        MessageIdMapper::new(Arc::new(InMemoryThreadStore::new()))
    }

    #[test]
    fn test_record_and_resolve() {
        let mapper = mapper();
        let message = FetchedMessage::builder(MessageId::new("101"), ThreadId::new("t1"))
            .mime_message_id("a@example.com")
            .build();

        let mapping = mapper.record(&message).unwrap().unwrap();
        assert_eq!(mapping.mime_message_id, MimeMessageId::new("a@example.com"));

        let resolved = mapper.resolve(&MessageId::new("101")).unwrap().unwrap();
        assert_eq!(resolved, mapping);
        assert_eq!(
            mapper.mime_ids_for_thread(&ThreadId::new("t1")).unwrap(),
            vec![MimeMessageId::new("a@example.com")]
        );
    }

    #[test]
    fn test_record_without_message_id() {
        let mapper = mapper();
        let message = FetchedMessage::builder(MessageId::new("101"), ThreadId::new("t1"))
            .header(MESSAGE_ID_HEADER, "   ")
            .build();

        assert!(mapper.record(&message).unwrap().is_none());
        assert!(mapper.resolve(&MessageId::new("101")).unwrap().is_none());
    }

    #[test]
    fn test_forget() {
        let mapper = mapper();
        let message = FetchedMessage::builder(MessageId::new("7"), ThreadId::new("t1"))
            .mime_message_id("x@y")
            .build();
        mapper.record(&message).unwrap();

        mapper.forget(&MessageId::new("7")).unwrap();
        assert!(mapper.resolve(&MessageId::new("7")).unwrap().is_none());
        // Forgetting twice is fine
        mapper.forget(&MessageId::new("7")).unwrap();
    }
}
