//! Storage traits and implementations
//!
//! This module defines the storage abstraction for thread trees and the
//! mailbox-message mappings that point into them. The trait-based design
//! allows swapping between in-memory and persistent storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryThreadStore;
pub use sqlite::SqliteThreadStore;
pub use traits::{MessageMapping, ThreadStore};
