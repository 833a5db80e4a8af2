//! Reply indexing
//!
//! Glue between mailbox events, thread trees and a document index.

mod handler;
mod sink;

pub use handler::{AddOutcome, MissingThreadTreeError, ReplyIndexHandler};
pub use sink::{DocumentSink, InMemoryDocumentSink, IndexDocument};
