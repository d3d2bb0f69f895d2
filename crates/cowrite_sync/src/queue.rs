//! Durable sync queue.
//!
//! An append-only list of pending mutation intents layered over a
//! [`SyncStorage`] backend. Every mutation is persisted before the call
//! returns, so a crash after `mark_synced` can never resurrect an item and
//! a crash before it can never lose one.
//!
//! # Coalescing policy
//!
//! Enqueuing a second update intent for a `(entity_type, entity_id,
//! operation)` key that already has a pending item does not duplicate it:
//! the latest payload wins, the original `created_at` is preserved for
//! fairness ordering, and retry state is reset. This is intended behavior -
//! two pending updates for the same document describe the same "push current
//! state" intent. Callers building strict causal ordering on top must not
//! rely on one queue item per edit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::storage::{StorageResult, SyncStorage};
use crate::types::{QueueItemStatus, QueueOperation, QueueStats, SyncQueueItem};

/// Durable queue of pending mutation intents.
///
/// The queue keeps an in-memory index of every retained record and writes
/// through to storage on each mutation. The orchestrator is the only writer.
pub struct SyncQueue {
    storage: Arc<dyn SyncStorage>,
    policy: RetryPolicy,
    items: RwLock<HashMap<Uuid, SyncQueueItem>>,
}

impl SyncQueue {
    /// Load the queue from storage, rebuilding the in-memory index.
    pub fn load(storage: Arc<dyn SyncStorage>, policy: RetryPolicy) -> StorageResult<Self> {
        let loaded = storage.load_items()?;
        log::debug!("[SyncQueue] Loaded {} retained items", loaded.len());
        let items = loaded.into_iter().map(|item| (item.id, item)).collect();
        Ok(Self {
            storage,
            policy,
            items: RwLock::new(items),
        })
    }

    /// Enqueue a mutation intent, coalescing with an existing pending item
    /// for the same key (see module docs for the policy).
    ///
    /// Returns the id of the retained item.
    pub fn enqueue(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: QueueOperation,
        payload: Vec<u8>,
        priority: i32,
    ) -> StorageResult<Uuid> {
        let mut items = self.items.write().unwrap();

        if let Some(item) = items.values_mut().find(|item| {
            item.status == QueueItemStatus::Pending
                && item.coalesce_key() == (entity_type, entity_id, operation)
        }) {
            log::debug!(
                "[SyncQueue] Coalescing update for {}/{} into {}",
                entity_type,
                entity_id,
                item.id
            );
            item.payload = payload;
            item.priority = priority;
            item.retry_count = 0;
            item.next_attempt_at = chrono::Utc::now().timestamp_millis();
            item.last_error = None;
            let snapshot = item.clone();
            drop(items);
            self.storage.put_item(&snapshot)?;
            return Ok(snapshot.id);
        }

        let item = SyncQueueItem::new(entity_type, entity_id, operation, payload, priority);
        items.insert(item.id, item.clone());
        drop(items);
        self.storage.put_item(&item)?;
        Ok(item.id)
    }

    /// Items eligible for a delivery attempt at `now` (milliseconds),
    /// ordered by `(priority, created_at)` ascending.
    pub fn next_batch_ready(&self, now: i64) -> Vec<SyncQueueItem> {
        let items = self.items.read().unwrap();
        let mut batch: Vec<SyncQueueItem> = items
            .values()
            .filter(|item| item.status == QueueItemStatus::Pending && item.next_attempt_at <= now)
            .cloned()
            .collect();
        batch.sort_by_key(|item| (item.priority, item.created_at));
        batch
    }

    /// Mark an item as delivered. Idempotent: marking an already-synced or
    /// unknown item is a no-op.
    pub fn mark_synced(&self, id: Uuid) -> StorageResult<()> {
        let mut items = self.items.write().unwrap();
        let Some(item) = items.get_mut(&id) else {
            return Ok(());
        };
        if item.status == QueueItemStatus::Synced {
            return Ok(());
        }
        item.status = QueueItemStatus::Synced;
        item.last_error = None;
        let snapshot = item.clone();
        drop(items);
        self.storage.put_item(&snapshot)
    }

    /// Record a failed delivery attempt.
    ///
    /// Increments the retry count and pushes the retry-eligibility timestamp
    /// forward with exponential backoff. Once the retry count exceeds the
    /// configured ceiling the item becomes terminally failed.
    ///
    /// Returns true if the item is now terminal.
    pub fn mark_failed(&self, id: Uuid, reason: &str) -> StorageResult<bool> {
        let mut items = self.items.write().unwrap();
        let Some(item) = items.get_mut(&id) else {
            return Ok(false);
        };

        item.retry_count += 1;
        item.last_error = Some(reason.to_string());

        let terminal = item.retry_count > self.policy.max_retries;
        if terminal {
            item.status = QueueItemStatus::Failed;
            log::warn!(
                "[SyncQueue] Item {} for {}/{} failed terminally after {} attempts: {}",
                id,
                item.entity_type,
                item.entity_id,
                item.retry_count,
                reason
            );
        } else {
            let delay = self.policy.delay_for(item.retry_count);
            item.next_attempt_at = chrono::Utc::now().timestamp_millis() + delay;
            log::debug!(
                "[SyncQueue] Item {} failed (attempt {}), retrying in {}ms: {}",
                id,
                item.retry_count,
                delay,
                reason
            );
        }

        let snapshot = item.clone();
        drop(items);
        self.storage.put_item(&snapshot)?;
        Ok(terminal)
    }

    /// Mark an item terminally failed without consuming a retry slot.
    ///
    /// Used for non-retryable failures (unknown entity type, malformed
    /// item) so operators can tell "will retry" and "will never succeed
    /// as-is" apart.
    pub fn mark_failed_terminal(&self, id: Uuid, reason: &str) -> StorageResult<()> {
        let mut items = self.items.write().unwrap();
        let Some(item) = items.get_mut(&id) else {
            return Ok(());
        };
        item.status = QueueItemStatus::Failed;
        item.last_error = Some(reason.to_string());
        log::warn!("[SyncQueue] Item {} failed terminally (non-retryable): {}", id, reason);
        let snapshot = item.clone();
        drop(items);
        self.storage.put_item(&snapshot)
    }

    /// Remove retained items.
    ///
    /// With `only_terminal` set, removes synced and terminally failed items
    /// and keeps pending ones; otherwise removes everything.
    pub fn clear(&self, only_terminal: bool) -> StorageResult<usize> {
        let mut items = self.items.write().unwrap();
        let ids: Vec<Uuid> = items
            .values()
            .filter(|item| !only_terminal || item.status != QueueItemStatus::Pending)
            .map(|item| item.id)
            .collect();
        for id in &ids {
            items.remove(id);
        }
        drop(items);
        self.storage.delete_items(&ids)?;
        Ok(ids.len())
    }

    /// Look up a retained item by id.
    pub fn get(&self, id: Uuid) -> Option<SyncQueueItem> {
        self.items.read().unwrap().get(&id).cloned()
    }

    /// Queue statistics for UI consumption.
    pub fn stats(&self) -> QueueStats {
        let items = self.items.read().unwrap();
        let mut stats = QueueStats::default();
        for item in items.values() {
            match item.status {
                QueueItemStatus::Pending => stats.pending_count += 1,
                QueueItemStatus::Failed => stats.failed_count += 1,
                QueueItemStatus::Synced => {}
            }
            stats.total_failed_attempts += item.retry_count as u64;
        }
        stats
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("stats", &self.stats())
            .finish()
    }
}
