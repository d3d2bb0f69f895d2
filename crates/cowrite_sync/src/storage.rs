//! Storage abstraction for durable sync state.
//!
//! This module defines the [`SyncStorage`] trait which abstracts over
//! different storage backends (SQLite, in-memory) for persisting the sync
//! queue and the document content cache.

use uuid::Uuid;

use crate::error::SyncError;
use crate::types::SyncQueueItem;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, SyncError>;

/// Trait for durable sync storage backends.
///
/// The storage maintains two kinds of data:
/// 1. **Queue records**: pending mutation intents that must survive restarts
/// 2. **Document cache**: last-known content blobs keyed by document id
///
/// Every mutation must be durable before the call returns; the queue relies
/// on this so a crash after `mark_synced` never resurrects an item.
pub trait SyncStorage: Send + Sync {
    /// Load every retained queue record.
    ///
    /// Called once at startup to rebuild the in-memory queue index.
    fn load_items(&self) -> StorageResult<Vec<SyncQueueItem>>;

    /// Insert or replace a queue record by id.
    fn put_item(&self, item: &SyncQueueItem) -> StorageResult<()>;

    /// Delete the queue records with the given ids. Missing ids are ignored.
    fn delete_items(&self, ids: &[Uuid]) -> StorageResult<()>;

    /// Store a document content blob, replacing any previous entry.
    fn put_cached_doc(&self, document_id: &str, content: &[u8]) -> StorageResult<()>;

    /// Load a cached document content blob.
    ///
    /// Returns `None` if the document has never been cached.
    fn get_cached_doc(&self, document_id: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove a cached document content blob. Missing ids are ignored.
    fn remove_cached_doc(&self, document_id: &str) -> StorageResult<()>;

    /// Total size of all cached document content, in bytes.
    fn cache_size_bytes(&self) -> StorageResult<u64>;
}
