//! Core types shared across the synchronization engine.
//!
//! This module defines the persisted queue record, per-document sync state,
//! and the statistics surfaced to the UI layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity type handled by the document sync path.
pub const ENTITY_DOCUMENT: &str = "document";

/// Operation carried by a queue item.
///
/// Only `Update` exists today; the enum leaves room for delete/rename
/// intents without a storage migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueOperation {
    /// Push the entity's current CRDT update to the server.
    Update,
}

impl std::fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueOperation::Update => write!(f, "update"),
        }
    }
}

impl std::str::FromStr for QueueOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(QueueOperation::Update),
            _ => Err(format!("Unknown queue operation: {}", s)),
        }
    }
}

/// Status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItemStatus {
    /// Waiting for a worker tick (possibly backing off after failures).
    Pending,

    /// Confirmed delivered; retained until cleared.
    Synced,

    /// Terminal failure; excluded from retry scans, retained for inspection.
    Failed,
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemStatus::Pending => write!(f, "pending"),
            QueueItemStatus::Synced => write!(f, "synced"),
            QueueItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueItemStatus::Pending),
            "synced" => Ok(QueueItemStatus::Synced),
            "failed" => Ok(QueueItemStatus::Failed),
            _ => Err(format!("Unknown queue item status: {}", s)),
        }
    }
}

/// A pending mutation intent, persisted to survive process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Stable identity, assigned at enqueue time.
    pub id: Uuid,

    /// Entity kind this intent applies to. Only [`ENTITY_DOCUMENT`] is
    /// handled; unknown types fail terminally without consuming a retry.
    pub entity_type: String,

    /// Identity of the entity (document id for document intents).
    pub entity_id: String,

    /// Operation to perform.
    pub operation: QueueOperation,

    /// Opaque CRDT update bytes (or encoded vector clock).
    pub payload: Vec<u8>,

    /// Unix timestamp when the intent was first enqueued (milliseconds).
    /// Preserved across payload coalescing for fairness ordering.
    pub created_at: i64,

    /// Number of failed delivery attempts so far.
    pub retry_count: u32,

    /// Drain priority; lower drains first, ties broken by `created_at`.
    pub priority: i32,

    /// Current status.
    pub status: QueueItemStatus,

    /// Unix timestamp (milliseconds) before which the item is not
    /// retry-eligible. Pushed forward by exponential backoff on failure.
    pub next_attempt_at: i64,

    /// Text of the most recent failure, if any.
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    /// Create a new pending item with the given identity and payload.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: QueueOperation,
        payload: Vec<u8>,
        priority: i32,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation,
            payload,
            created_at: now,
            retry_count: 0,
            priority,
            status: QueueItemStatus::Pending,
            next_attempt_at: now,
            last_error: None,
        }
    }

    /// Coalescing key: two pending items with equal keys describe the same
    /// intent and are merged (latest payload wins).
    pub fn coalesce_key(&self) -> (&str, &str, QueueOperation) {
        (&self.entity_type, &self.entity_id, self.operation)
    }
}

/// Per-document sync status, driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Succeeded,
    Failed,
}

/// Tracked state for one open document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSyncState {
    /// Stable document identity, never reused.
    pub document_id: String,

    /// True iff local mutations exist that have not been confirmed synced.
    pub is_dirty: bool,

    /// Unix timestamp of the last confirmed sync (milliseconds).
    pub last_synced_at: Option<i64>,

    /// Current sync status. `Syncing` implies at most one in-flight
    /// operation for this document.
    pub status: SyncStatus,
}

impl DocumentSyncState {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            is_dirty: false,
            last_synced_at: None,
            status: SyncStatus::Idle,
        }
    }
}

/// Queue statistics for UI consumption.
///
/// The UI renders "pending", "syncing", "synced", and "failed, will retry"
/// purely from these counters and the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items waiting for delivery (including those backing off).
    pub pending_count: usize,

    /// Items in the terminal failed state.
    pub failed_count: usize,

    /// Sum of failed attempts across all retained items.
    pub total_failed_attempts: u64,
}
