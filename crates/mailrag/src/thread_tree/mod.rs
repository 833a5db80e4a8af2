//! Reply tracking for conversation threads
//!
//! A [`ThreadTree`] records which message replies to which within one thread,
//! keyed by `Message-ID`. It is append-only: deleted messages are tombstoned
//! rather than removed, so branch structure stays stable and callers can ask
//! whether a whole branch has gone (`is_branch_deleted`) before purging any
//! content derived from it.
//!
//! ## Module Structure
//!
//! - `tree`: the arena-backed forest and its queries
//! - `snapshot`: serializable form used by storage backends
//! - `error`: invariant violations

mod error;
mod snapshot;
mod tree;

pub use error::ThreadTreeError;
pub use snapshot::{SnapshotNode, ThreadTreeSnapshot};
pub use tree::ThreadTree;
