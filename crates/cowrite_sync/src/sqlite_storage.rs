//! SQLite-backed storage implementation for sync persistence.
//!
//! This module provides a persistent storage backend using SQLite for the
//! sync queue and the document content cache. Queue items written here
//! survive process restarts, which is what makes offline editing safe.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::SyncError;
use crate::storage::{StorageResult, SyncStorage};
use crate::types::{QueueItemStatus, QueueOperation, SyncQueueItem};

/// SQLite-backed sync storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Pending mutation intents (the durable sync queue)
            CREATE TABLE IF NOT EXISTS sync_queue (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                next_attempt_at INTEGER NOT NULL,
                last_error TEXT
            );

            -- Index for retry-eligibility scans
            CREATE INDEX IF NOT EXISTS idx_sync_queue_status
                ON sync_queue(status, next_attempt_at);

            -- Last-known document content, keyed by document id
            CREATE TABLE IF NOT EXISTS doc_cache (
                document_id TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncQueueItem> {
        let id: String = row.get(0)?;
        let operation: String = row.get(3)?;
        let status: String = row.get(8)?;
        Ok(SyncQueueItem {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            operation: operation.parse().unwrap_or(QueueOperation::Update),
            payload: row.get(4)?,
            created_at: row.get(5)?,
            retry_count: row.get(6)?,
            priority: row.get(7)?,
            status: status.parse().unwrap_or(QueueItemStatus::Pending),
            next_attempt_at: row.get(9)?,
            last_error: row.get(10)?,
        })
    }
}

impl SyncStorage for SqliteStorage {
    fn load_items(&self) -> StorageResult<Vec<SyncQueueItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, operation, payload, created_at,
                    retry_count, priority, status, next_attempt_at, last_error
             FROM sync_queue",
        )?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn put_item(&self, item: &SyncQueueItem) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_queue
                 (id, entity_type, entity_id, operation, payload, created_at,
                  retry_count, priority, status, next_attempt_at, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.id.to_string(),
                item.entity_type,
                item.entity_id,
                item.operation.to_string(),
                item.payload,
                item.created_at,
                item.retry_count,
                item.priority,
                item.status.to_string(),
                item.next_attempt_at,
                item.last_error,
            ],
        )?;
        Ok(())
    }

    fn delete_items(&self, ids: &[Uuid]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM sync_queue WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn put_cached_doc(&self, document_id: &str, content: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO doc_cache (document_id, content, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                document_id,
                content,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn get_cached_doc(&self, document_id: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT content FROM doc_cache WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        ) {
            Ok(content) => Ok(Some(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SyncError::from(e)),
        }
    }

    fn remove_cached_doc(&self, document_id: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM doc_cache WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(())
    }

    fn cache_size_bytes(&self) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM doc_cache",
            [],
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }
}
