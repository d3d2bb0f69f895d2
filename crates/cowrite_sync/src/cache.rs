//! Document content cache.
//!
//! A thin facade over [`SyncStorage`]'s cache facet: last-known content
//! blobs keyed by document id, with byte-size accounting so the settings
//! UI can report how much local space offline documents occupy.

use std::sync::Arc;

use crate::storage::{StorageResult, SyncStorage};

/// Cache of last-known document content, keyed by document id.
pub struct DocumentCache {
    storage: Arc<dyn SyncStorage>,
}

impl DocumentCache {
    pub fn new(storage: Arc<dyn SyncStorage>) -> Self {
        Self { storage }
    }

    /// Store the latest known content for a document.
    pub fn put(&self, document_id: &str, content: &[u8]) -> StorageResult<()> {
        self.storage.put_cached_doc(document_id, content)
    }

    /// Load cached content, or `None` if the document was never cached.
    pub fn get(&self, document_id: &str) -> StorageResult<Option<Vec<u8>>> {
        self.storage.get_cached_doc(document_id)
    }

    /// Drop cached content for a document (e.g., when it is deleted).
    pub fn remove(&self, document_id: &str) -> StorageResult<()> {
        self.storage.remove_cached_doc(document_id)
    }

    /// Total cached bytes across all documents.
    pub fn size_bytes(&self) -> StorageResult<u64> {
        self.storage.cache_size_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryStorage;

    #[test]
    fn test_cache_facade() {
        let cache = DocumentCache::new(Arc::new(MemoryStorage::new()));

        cache.put("doc1", b"# Notes").unwrap();
        assert_eq!(cache.get("doc1").unwrap(), Some(b"# Notes".to_vec()));
        assert_eq!(cache.size_bytes().unwrap(), 7);

        cache.remove("doc1").unwrap();
        assert!(cache.get("doc1").unwrap().is_none());
        assert_eq!(cache.size_bytes().unwrap(), 0);
    }
}
