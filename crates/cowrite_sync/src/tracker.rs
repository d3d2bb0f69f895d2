//! Per-document sync state tracking.
//!
//! Pure in-memory bookkeeping layered over the CRDT engine's own state:
//! dirty flags, last-synced timestamps, and the single-flight claim shared
//! by the queue worker and the auto-sync sweep. None of these operations
//! fail under normal operation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{DocumentSyncState, SyncStatus};

/// Tracks sync state for every open document.
///
/// Entries are created lazily on first access and evicted explicitly when
/// the document is closed. The orchestrator is the sole writer.
#[derive(Debug, Default)]
pub struct DocumentStateTracker {
    docs: RwLock<HashMap<String, DocumentSyncState>>,
}

impl DocumentStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state for a document, creating it on first use.
    pub fn get(&self, document_id: &str) -> DocumentSyncState {
        let mut docs = self.docs.write().unwrap();
        docs.entry(document_id.to_string())
            .or_insert_with(|| DocumentSyncState::new(document_id))
            .clone()
    }

    /// Record a local edit. Idempotent.
    pub fn mark_dirty(&self, document_id: &str) {
        let mut docs = self.docs.write().unwrap();
        let state = docs
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentSyncState::new(document_id));
        state.is_dirty = true;
    }

    /// Record a confirmed sync: clears the dirty flag and stamps the time.
    pub fn mark_synced(&self, document_id: &str) {
        let mut docs = self.docs.write().unwrap();
        let state = docs
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentSyncState::new(document_id));
        state.is_dirty = false;
        state.last_synced_at = Some(chrono::Utc::now().timestamp_millis());
        state.status = SyncStatus::Succeeded;
    }

    pub fn is_dirty(&self, document_id: &str) -> bool {
        let docs = self.docs.read().unwrap();
        docs.get(document_id).is_some_and(|s| s.is_dirty)
    }

    /// Ids of all documents with unconfirmed local edits.
    pub fn all_dirty_ids(&self) -> Vec<String> {
        let docs = self.docs.read().unwrap();
        docs.values()
            .filter(|s| s.is_dirty)
            .map(|s| s.document_id.clone())
            .collect()
    }

    /// Claim the single-flight slot for a document.
    ///
    /// Returns false if a sync is already in flight, in which case the
    /// caller must skip the document. The check and the transition happen
    /// under one lock, so the queue worker and the auto-sync sweep can
    /// never both win.
    pub fn begin_sync(&self, document_id: &str) -> bool {
        let mut docs = self.docs.write().unwrap();
        let state = docs
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentSyncState::new(document_id));
        if state.status == SyncStatus::Syncing {
            return false;
        }
        state.status = SyncStatus::Syncing;
        true
    }

    /// Release the single-flight slot, recording the outcome.
    ///
    /// On success the document is clean and stamped; on failure it keeps
    /// its dirty flag so a later sweep picks it up again.
    pub fn finish_sync(&self, document_id: &str, ok: bool) {
        let mut docs = self.docs.write().unwrap();
        let Some(state) = docs.get_mut(document_id) else {
            return;
        };
        if ok {
            state.is_dirty = false;
            state.last_synced_at = Some(chrono::Utc::now().timestamp_millis());
            state.status = SyncStatus::Succeeded;
        } else {
            state.status = SyncStatus::Failed;
        }
    }

    /// Drop tracking state for a closed document.
    pub fn evict(&self, document_id: &str) {
        let mut docs = self.docs.write().unwrap();
        docs.remove(document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation() {
        let tracker = DocumentStateTracker::new();
        let state = tracker.get("doc1");
        assert_eq!(state.document_id, "doc1");
        assert!(!state.is_dirty);
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.last_synced_at.is_none());
    }

    #[test]
    fn test_mark_dirty_is_idempotent() {
        let tracker = DocumentStateTracker::new();
        tracker.mark_dirty("doc1");
        tracker.mark_dirty("doc1");
        assert!(tracker.is_dirty("doc1"));
        assert_eq!(tracker.all_dirty_ids(), vec!["doc1".to_string()]);
    }

    #[test]
    fn test_mark_synced_clears_dirty() {
        let tracker = DocumentStateTracker::new();
        tracker.mark_dirty("doc1");
        tracker.mark_synced("doc1");
        assert!(!tracker.is_dirty("doc1"));
        let state = tracker.get("doc1");
        assert_eq!(state.status, SyncStatus::Succeeded);
        assert!(state.last_synced_at.is_some());
    }

    #[test]
    fn test_single_flight_claim() {
        let tracker = DocumentStateTracker::new();
        assert!(tracker.begin_sync("doc1"));
        // Second claim loses until the first finishes
        assert!(!tracker.begin_sync("doc1"));
        tracker.finish_sync("doc1", true);
        assert!(tracker.begin_sync("doc1"));
    }

    #[test]
    fn test_failed_sync_keeps_dirty() {
        let tracker = DocumentStateTracker::new();
        tracker.mark_dirty("doc1");
        assert!(tracker.begin_sync("doc1"));
        tracker.finish_sync("doc1", false);
        assert!(tracker.is_dirty("doc1"));
        assert_eq!(tracker.get("doc1").status, SyncStatus::Failed);
    }

    #[test]
    fn test_evict() {
        let tracker = DocumentStateTracker::new();
        tracker.mark_dirty("doc1");
        tracker.evict("doc1");
        assert!(!tracker.is_dirty("doc1"));
        assert!(tracker.all_dirty_ids().is_empty());
    }
}
