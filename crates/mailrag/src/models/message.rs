//! Message identifiers and the fetched-message shape consumed by thread trees

use super::ThreadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the RFC 5322 message identifier
pub const MESSAGE_ID_HEADER: &str = "Message-ID";
/// Header carrying the identifier of the message being replied to
pub const IN_REPLY_TO_HEADER: &str = "In-Reply-To";
/// Subject header
pub const SUBJECT_HEADER: &str = "Subject";

/// Mailbox-level identifier of a stored message
///
/// This is what mailbox events (such as expunges) carry. It is unrelated to the
/// `Message-ID` header; see [`MimeMessageId`] for that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier taken from a `Message-ID` (or `In-Reply-To`) header
///
/// Stored without the surrounding angle brackets. Two ids are equal when their
/// header values are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MimeMessageId(pub String);

impl MimeMessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a header value into an id
    ///
    /// The first `<...>` token wins when present, otherwise the first
    /// whitespace-separated token. Returns `None` for empty values, `<>` and
    /// an unterminated `<`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();

        if let Some(start) = value.find('<') {
            let rest = &value[start + 1..];
            let end = rest.find('>')?;
            let id = rest[..end].trim();
            if id.is_empty() {
                return None;
            }
            return Some(Self(id.to_string()));
        }

        value
            .split_whitespace()
            .next()
            .map(|token| Self(token.to_string()))
    }
}

impl fmt::Display for MimeMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MimeMessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MimeMessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A raw header (name-value pair), kept in message order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A message as fetched from the mail store
///
/// Carries just what threading and reply extraction need: the headers, the
/// server-received date used for ordering, and the plaintext body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedMessage {
    /// Mailbox message ID
    pub message_id: MessageId,
    /// Thread this message belongs to
    pub thread_id: ThreadId,
    /// All headers, in message order
    pub headers: Vec<Header>,
    /// When the server received the message
    pub internal_date: DateTime<Utc>,
    /// Subject line
    pub subject: String,
    /// Plaintext body, if the message has one
    pub body_text: Option<String>,
}

impl FetchedMessage {
    /// Create a new message builder
    pub fn builder(message_id: MessageId, thread_id: ThreadId) -> FetchedMessageBuilder {
        FetchedMessageBuilder::new(message_id, thread_id)
    }

    /// Value of the first header with the given name (ASCII case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Parsed `Message-ID`, or `None` when absent or unparseable
    pub fn mime_message_id(&self) -> Option<MimeMessageId> {
        self.header(MESSAGE_ID_HEADER).and_then(MimeMessageId::parse)
    }

    /// Parsed `In-Reply-To`, or `None` when absent or unparseable
    pub fn in_reply_to(&self) -> Option<MimeMessageId> {
        self.header(IN_REPLY_TO_HEADER).and_then(MimeMessageId::parse)
    }
}

/// Builder for creating FetchedMessage instances
pub struct FetchedMessageBuilder {
    message_id: MessageId,
    thread_id: ThreadId,
    headers: Vec<Header>,
    internal_date: Option<DateTime<Utc>>,
    subject: Option<String>,
    body_text: Option<String>,
}

impl FetchedMessageBuilder {
    fn new(message_id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            message_id,
            thread_id,
            headers: Vec::new(),
            internal_date: None,
            subject: None,
            body_text: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    /// Shorthand for a `Message-ID` header wrapping the value in angle brackets
    pub fn mime_message_id(self, id: &str) -> Self {
        self.header(MESSAGE_ID_HEADER, format!("<{}>", id))
    }

    /// Shorthand for an `In-Reply-To` header wrapping the value in angle brackets
    pub fn in_reply_to(self, id: &str) -> Self {
        self.header(IN_REPLY_TO_HEADER, format!("<{}>", id))
    }

    pub fn internal_date(mut self, internal_date: DateTime<Utc>) -> Self {
        self.internal_date = Some(internal_date);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn body_text(mut self, body_text: Option<String>) -> Self {
        self.body_text = body_text;
        self
    }

    pub fn build(self) -> FetchedMessage {
        // Fall back to the Subject header when no explicit subject was given
        let subject = self.subject.unwrap_or_else(|| {
            self.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(SUBJECT_HEADER))
                .map(|h| h.value.trim().to_string())
                .unwrap_or_default()
        });

        FetchedMessage {
            message_id: self.message_id,
            thread_id: self.thread_id,
            headers: self.headers,
            internal_date: self.internal_date.unwrap_or_else(Utc::now),
            subject,
            body_text: self.body_text,
        }
    }
}
