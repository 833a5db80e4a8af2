//! Domain models for threading and reply extraction

mod message;
mod thread;

pub use message::{
    FetchedMessage, FetchedMessageBuilder, Header, IN_REPLY_TO_HEADER, MESSAGE_ID_HEADER,
    MessageId, MimeMessageId, SUBJECT_HEADER,
};
pub use thread::ThreadId;
