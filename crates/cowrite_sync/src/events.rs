//! Sync event log.
//!
//! Every observable outcome of the orchestrator lands here as a totally
//! ordered, replayable sequence. Consumers (UI, tests) can reconstruct
//! exactly which documents synced and which failed from this log alone,
//! without access to internal error objects.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

/// One entry in the sync event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A sync attempt for a document began.
    Started { document_id: String },

    /// A sync attempt completed successfully.
    Success { document_id: String },

    /// A sync attempt failed. `will_retry` distinguishes transient
    /// failures from terminal ones so the UI can tell them apart.
    Error {
        document_id: String,
        message: String,
        will_retry: bool,
    },

    /// An auto-sync sweep over dirty documents finished.
    Completed,

    /// Connectivity transitioned to online.
    Online,

    /// Connectivity transitioned to offline.
    Offline,

    /// A queue worker tick finished draining its batch.
    QueueProcessed { synced: usize, failed: usize },
}

/// Replayable, subscribable event log.
///
/// The full ordered history stays in memory (bounded by an explicit cap);
/// live consumers subscribe to a broadcast channel. Emission never blocks
/// and never fails: a lagging or absent subscriber only misses broadcast
/// delivery, the log itself is complete.
pub struct EventLog {
    entries: Mutex<Vec<SyncEvent>>,
    tx: broadcast::Sender<SyncEvent>,
    max_entries: usize,
}

impl EventLog {
    /// Create a log retaining at most `max_entries` events.
    pub fn new(max_entries: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(Vec::new()),
            tx,
            max_entries,
        }
    }

    /// Append an event and notify live subscribers.
    pub fn emit(&self, event: SyncEvent) {
        log::debug!("[SyncEvents] {:?}", event);
        {
            let mut entries = self.entries.lock().unwrap();
            if entries.len() >= self.max_entries {
                entries.remove(0);
            }
            entries.push(event.clone());
        }
        let _ = self.tx.send(event);
    }

    /// Snapshot of the ordered history.
    pub fn snapshot(&self) -> Vec<SyncEvent> {
        self.entries.lock().unwrap().clone()
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Drop the retained history (subscribers are unaffected).
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}
