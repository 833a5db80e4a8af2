//! SQLite-based thread tree storage
//!
//! Trees are stored as zstd-compressed JSON snapshots, one row per thread,
//! next to a table mapping mailbox message IDs to tree nodes.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::{MessageMapping, ThreadStore};
use crate::models::{MessageId, MimeMessageId, ThreadId};
use crate::thread_tree::{ThreadTree, ThreadTreeError, ThreadTreeSnapshot};

/// zstd level for snapshot blobs
const COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One snapshot per thread
            CREATE TABLE thread_trees (
                thread_id TEXT PRIMARY KEY,
                snapshot BLOB NOT NULL,  -- zstd compressed JSON
                node_count INTEGER NOT NULL DEFAULT 0,
                deleted_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Mailbox message -> tree node
            CREATE TABLE message_mappings (
                message_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                mime_message_id TEXT NOT NULL
            );

            CREATE INDEX idx_message_mappings_thread ON message_mappings(thread_id);
            "#,
        ),
        // Migration 2: Lookup by node within a thread
        M::up(
            r#"
            CREATE INDEX idx_message_mappings_node
                ON message_mappings(thread_id, mime_message_id);
            "#,
        ),
    ])
}

/// SQLite-based thread store
pub struct SqliteThreadStore {
    conn: Mutex<Connection>,
}

impl SqliteThreadStore {
    /// Open (or create) a store at `db_path` and run pending migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed during writes; NORMAL sync is safe with WAL
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store raw snapshot bytes for a thread without validating them
    ///
    /// Lets tests simulate corrupted persisted state.
    pub fn insert_raw_snapshot(&self, thread_id: &ThreadId, snapshot: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO thread_trees (thread_id, snapshot, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(thread_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at",
            params![thread_id.as_str(), snapshot, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Serialize and compress a snapshot
fn encode_snapshot(snapshot: &ThreadTreeSnapshot) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(snapshot).context("Failed to serialize thread tree")?;
    zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL).context("Failed to compress thread tree")
}

/// Decompress, parse and validate a stored snapshot
///
/// Every failure here means the stored data is unusable, so all of them
/// surface as [`ThreadTreeError::InvalidSnapshot`].
fn decode_snapshot(thread_id: &ThreadId, data: &[u8]) -> Result<ThreadTree, ThreadTreeError> {
    let json = zstd::decode_all(data).map_err(|e| {
        ThreadTreeError::InvalidSnapshot(format!(
            "failed to decompress tree of {}: {}",
            thread_id, e
        ))
    })?;

    let snapshot: ThreadTreeSnapshot = serde_json::from_slice(&json).map_err(|e| {
        ThreadTreeError::InvalidSnapshot(format!("failed to parse tree of {}: {}", thread_id, e))
    })?;

    if &snapshot.thread_id != thread_id {
        return Err(ThreadTreeError::InvalidSnapshot(format!(
            "row for thread {} holds the tree of thread {}",
            thread_id, snapshot.thread_id
        )));
    }

    ThreadTree::from_snapshot(snapshot)
}

impl ThreadStore for SqliteThreadStore {
    fn save_tree(&self, tree: &ThreadTree) -> Result<()> {
        let snapshot = tree.snapshot();
        let compressed = encode_snapshot(&snapshot)?;

        let conn = self.conn.lock().unwrap();
        // ON CONFLICT DO UPDATE keeps the row identity stable
        conn.execute(
            "INSERT INTO thread_trees
             (thread_id, snapshot, node_count, deleted_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(thread_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                node_count = excluded.node_count,
                deleted_count = excluded.deleted_count,
                updated_at = excluded.updated_at",
            params![
                snapshot.thread_id.as_str(),
                compressed,
                snapshot.nodes.len() as i64,
                snapshot.deleted_count() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(
            "[STORE] Saved tree {} ({} nodes, {} deleted)",
            snapshot.thread_id,
            snapshot.nodes.len(),
            snapshot.deleted_count()
        );

        Ok(())
    }

    fn load_tree(&self, thread_id: &ThreadId) -> Result<Option<ThreadTree>> {
        let data: Option<Vec<u8>> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT snapshot FROM thread_trees WHERE thread_id = ?",
                [thread_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };

        let Some(data) = data else {
            return Ok(None);
        };

        // Decode outside the lock
        Ok(Some(decode_snapshot(thread_id, &data)?))
    }

    fn has_tree(&self, thread_id: &ThreadId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM thread_trees WHERE thread_id = ?)",
            [thread_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_tree(&self, thread_id: &ThreadId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM thread_trees WHERE thread_id = ?",
            [thread_id.as_str()],
        )?;
        Ok(())
    }

    fn list_tree_ids(&self) -> Result<Vec<ThreadId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT thread_id FROM thread_trees ORDER BY thread_id")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(ThreadId::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    fn count_trees(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM thread_trees", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn put_mapping(&self, mapping: MessageMapping) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO message_mappings (message_id, thread_id, mime_message_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                mime_message_id = excluded.mime_message_id",
            params![
                mapping.message_id.as_str(),
                mapping.thread_id.as_str(),
                mapping.mime_message_id.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_mapping(&self, message_id: &MessageId) -> Result<Option<MessageMapping>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT thread_id, mime_message_id FROM message_mappings WHERE message_id = ?",
                [message_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(thread_id, mime_message_id)| {
            MessageMapping::new(
                message_id.clone(),
                ThreadId::new(thread_id),
                MimeMessageId::new(mime_message_id),
            )
        }))
    }

    fn remove_mapping(&self, message_id: &MessageId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM message_mappings WHERE message_id = ?",
            [message_id.as_str()],
        )?;
        Ok(())
    }

    fn list_mappings_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<MessageMapping>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT message_id, mime_message_id FROM message_mappings
             WHERE thread_id = ?
             ORDER BY message_id",
        )?;

        let mappings = stmt
            .query_map([thread_id.as_str()], |row| {
                Ok(MessageMapping::new(
                    MessageId::new(row.get::<_, String>(0)?),
                    thread_id.clone(),
                    MimeMessageId::new(row.get::<_, String>(1)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(mappings)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM message_mappings;
             DELETE FROM thread_trees;",
        )?;
        Ok(())
    }
}
