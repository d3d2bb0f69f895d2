//! In-memory storage implementation for testing.
//!
//! This provides a simple in-memory implementation of [`SyncStorage`]
//! for use in unit tests and development. Data is lost when dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::storage::{StorageResult, SyncStorage};
use crate::types::SyncQueueItem;

/// In-memory sync storage for testing.
///
/// Thread-safe via `RwLock`; "durability" here is simply the lifetime of
/// the process, which is all the tests need.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<Uuid, SyncQueueItem>>,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStorage for MemoryStorage {
    fn load_items(&self) -> StorageResult<Vec<SyncQueueItem>> {
        let items = self.items.read().unwrap();
        Ok(items.values().cloned().collect())
    }

    fn put_item(&self, item: &SyncQueueItem) -> StorageResult<()> {
        let mut items = self.items.write().unwrap();
        items.insert(item.id, item.clone());
        Ok(())
    }

    fn delete_items(&self, ids: &[Uuid]) -> StorageResult<()> {
        let mut items = self.items.write().unwrap();
        for id in ids {
            items.remove(id);
        }
        Ok(())
    }

    fn put_cached_doc(&self, document_id: &str, content: &[u8]) -> StorageResult<()> {
        let mut cache = self.cache.write().unwrap();
        cache.insert(document_id.to_string(), content.to_vec());
        Ok(())
    }

    fn get_cached_doc(&self, document_id: &str) -> StorageResult<Option<Vec<u8>>> {
        let cache = self.cache.read().unwrap();
        Ok(cache.get(document_id).cloned())
    }

    fn remove_cached_doc(&self, document_id: &str) -> StorageResult<()> {
        let mut cache = self.cache.write().unwrap();
        cache.remove(document_id);
        Ok(())
    }

    fn cache_size_bytes(&self) -> StorageResult<u64> {
        let cache = self.cache.read().unwrap();
        Ok(cache.values().map(|v| v.len() as u64).sum())
    }
}
