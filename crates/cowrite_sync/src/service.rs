//! Sync orchestrator.
//!
//! Ties the queue, tracker, connectivity monitor, CRDT engine and transport
//! together: periodic queue draining, the auto-sync sweep over dirty
//! documents, connectivity-triggered sync, and the event stream. This is
//! the only component with retry policy and ordering guarantees; the queue
//! and tracker are owned here and mutated nowhere else.
//!
//! Two sync paths exist on purpose. The durable queue is the crash-safe
//! fallback for documents edited while offline or backgrounded; the sweep
//! is the fast path for an actively-edited open document. A document being
//! processed by one path is skipped by the other until it completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::engine::CrdtEngine;
use crate::error::{Result, SyncError};
use crate::events::{EventLog, SyncEvent};
use crate::queue::SyncQueue;
use crate::tracker::DocumentStateTracker;
use crate::transport::socket::BoxFuture;
use crate::types::{ENTITY_DOCUMENT, QueueOperation, QueueStats, SyncQueueItem};

/// Delivery seam between the orchestrator and the transport.
///
/// [`crate::transport::RealtimeSession`] implements this over its live
/// connection; tests substitute mocks. A `NotConnected` failure is
/// transient - the item backs off and retries once a session exists.
pub trait UpdateTransmitter: Send + Sync {
    /// Deliver an opaque CRDT update for a document. Resolves once the
    /// server confirmed receipt (or the send failed).
    fn transmit(&self, document_id: &str, update: &[u8]) -> BoxFuture<'_, Result<()>>;
}

enum ItemOutcome {
    Synced,
    Failed,
    Skipped,
}

/// The coordination core of the sync engine.
///
/// Constructed with every collaborator passed in explicitly; there are no
/// ambient globals. `start` spawns the periodic loops, `dispose` cancels
/// them. In-flight queue items are always left in their last durable state.
pub struct SyncService {
    config: SyncConfig,
    queue: Arc<SyncQueue>,
    tracker: Arc<DocumentStateTracker>,
    engine: Arc<dyn CrdtEngine>,
    transmitter: Arc<dyn UpdateTransmitter>,
    connectivity: Arc<ConnectivityMonitor>,
    events: Arc<EventLog>,
    worker_running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        queue: Arc<SyncQueue>,
        tracker: Arc<DocumentStateTracker>,
        engine: Arc<dyn CrdtEngine>,
        transmitter: Arc<dyn UpdateTransmitter>,
        connectivity: Arc<ConnectivityMonitor>,
        events: Arc<EventLog>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            tracker,
            engine,
            transmitter,
            connectivity,
            events,
            worker_running: AtomicBool::new(false),
            shutdown,
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Record a local edit so the auto-sync sweep picks the document up.
    pub fn mark_edited(&self, document_id: &str) {
        self.tracker.mark_dirty(document_id);
    }

    /// Record a local edit and enqueue a durable mutation intent for it.
    ///
    /// The payload is the enqueue-time update snapshot; delivery re-encodes
    /// from the engine so coalesced edits ship as one update.
    pub fn enqueue_update(&self, document_id: &str, payload: Vec<u8>) -> Result<Uuid> {
        self.tracker.mark_dirty(document_id);
        self.queue
            .enqueue(ENTITY_DOCUMENT, document_id, QueueOperation::Update, payload, 0)
    }

    /// Queue statistics for UI consumption.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// The ordered, replayable event log.
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Spawn the periodic loops: queue worker, auto-sync sweep, and the
    /// connectivity watcher. Idempotent; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            return;
        }

        // Queue worker: drain pending intents on a fixed interval while online
        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let interval = service.config.queue_interval();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        service.process_queue().await;
                    }
                }
            }
        }));

        // Auto-sync sweep: push dirty open documents on a slower cadence
        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let interval = service.config.auto_sync_interval();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        service.sweep_dirty().await;
                    }
                }
            }
        }));

        // Connectivity watcher: one immediate drain on each offline->online
        // transition; going offline just lets the timers idle
        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        let mut conn = self.connectivity.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut was_online = conn.borrow_and_update().is_online;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    changed = conn.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let is_online = conn.borrow_and_update().is_online;
                        if is_online && !was_online {
                            service.events.emit(SyncEvent::Online);
                            service.process_queue().await;
                        } else if !is_online && was_online {
                            service.events.emit(SyncEvent::Offline);
                        }
                        was_online = is_online;
                    }
                }
            }
        }));

        log::info!("[SyncService] Started");
    }

    /// Cancel all periodic work.
    ///
    /// In-flight queue items stay in their last durable state - nothing is
    /// lost and nothing is double-applied on the next start.
    pub fn dispose(&self) {
        let _ = self.shutdown.send(true);
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
        log::info!("[SyncService] Disposed");
    }

    /// Run one queue worker tick.
    ///
    /// Skipped entirely while offline or while another tick is running (the
    /// single-flight guarantee at the orchestrator level). Items drain
    /// sequentially - one in-flight mutation at a time bounds load - and
    /// one item's failure never aborts the rest of the batch.
    pub async fn process_queue(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        if self
            .worker_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("[SyncService] Worker tick already running, skipping");
            return;
        }

        let now = chrono::Utc::now().timestamp_millis();
        let batch = self.queue.next_batch_ready(now);
        log::debug!("[SyncService] Worker tick: {} items ready", batch.len());

        let mut synced = 0;
        let mut failed = 0;
        for item in &batch {
            match self.dispatch_item(item).await {
                ItemOutcome::Synced => synced += 1,
                ItemOutcome::Failed => failed += 1,
                ItemOutcome::Skipped => {}
            }
        }

        self.events.emit(SyncEvent::QueueProcessed { synced, failed });
        self.worker_running.store(false, Ordering::SeqCst);
    }

    /// Route a queue item to its handler by entity type.
    async fn dispatch_item(&self, item: &SyncQueueItem) -> ItemOutcome {
        if item.entity_type != ENTITY_DOCUMENT {
            let error = SyncError::UnknownEntityType(item.entity_type.clone());
            if let Err(e) = self.queue.mark_failed_terminal(item.id, &error.to_string()) {
                log::error!("[SyncService] Failed to persist terminal failure: {}", e);
            }
            self.events.emit(SyncEvent::Error {
                document_id: item.entity_id.clone(),
                message: error.to_string(),
                will_retry: false,
            });
            return ItemOutcome::Failed;
        }

        self.sync_document_item(item).await
    }

    /// Deliver one document-typed queue item.
    async fn sync_document_item(&self, item: &SyncQueueItem) -> ItemOutcome {
        let document_id = &item.entity_id;
        if !self.tracker.begin_sync(document_id) {
            // Mid-sync on the other path; the item stays pending for the
            // next tick
            log::debug!("[SyncService] {} is mid-sync, skipping item", document_id);
            return ItemOutcome::Skipped;
        }

        self.events.emit(SyncEvent::Started {
            document_id: document_id.clone(),
        });

        match self.push_current_state(document_id).await {
            Ok(()) => {
                if let Err(e) = self.queue.mark_synced(item.id) {
                    log::error!("[SyncService] Failed to persist synced state: {}", e);
                }
                self.tracker.finish_sync(document_id, true);
                self.events.emit(SyncEvent::Success {
                    document_id: document_id.clone(),
                });
                ItemOutcome::Synced
            }
            Err(error) => {
                let message = error.to_string();
                let terminal = if error.is_retryable() {
                    self.queue.mark_failed(item.id, &message).unwrap_or_else(|e| {
                        log::error!("[SyncService] Failed to persist failure: {}", e);
                        false
                    })
                } else {
                    if let Err(e) = self.queue.mark_failed_terminal(item.id, &message) {
                        log::error!("[SyncService] Failed to persist terminal failure: {}", e);
                    }
                    true
                };
                self.tracker.finish_sync(document_id, false);
                self.events.emit(SyncEvent::Error {
                    document_id: document_id.clone(),
                    message,
                    will_retry: !terminal,
                });
                ItemOutcome::Failed
            }
        }
    }

    /// Run one auto-sync sweep over dirty documents.
    ///
    /// Bypasses the durable queue: this is the fast path for open
    /// documents, while the queue remains the crash-safe fallback.
    pub async fn sweep_dirty(&self) {
        if !self.connectivity.is_online() {
            return;
        }

        for document_id in self.tracker.all_dirty_ids() {
            if !self.tracker.begin_sync(&document_id) {
                continue;
            }
            self.events.emit(SyncEvent::Started {
                document_id: document_id.clone(),
            });

            match self.push_current_state(&document_id).await {
                Ok(()) => {
                    self.tracker.finish_sync(&document_id, true);
                    self.events.emit(SyncEvent::Success { document_id });
                }
                Err(error) => {
                    // The document keeps its dirty flag; the next sweep or
                    // a queued intent retries it
                    self.tracker.finish_sync(&document_id, false);
                    self.events.emit(SyncEvent::Error {
                        document_id,
                        message: error.to_string(),
                        will_retry: true,
                    });
                }
            }
        }

        self.events.emit(SyncEvent::Completed);
    }

    /// Encode the document's current state and transmit it.
    ///
    /// Nothing to encode means nothing to sync: the attempt succeeds
    /// trivially.
    async fn push_current_state(&self, document_id: &str) -> Result<()> {
        match self.engine.encode_update(document_id)? {
            None => {
                log::debug!("[SyncService] Nothing to sync for {}", document_id);
                Ok(())
            }
            Some(update) => self.transmitter.transmit(document_id, &update).await,
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::connectivity::{ConnectivityState, LinkType};
    use crate::memory_storage::MemoryStorage;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct MockEngine {
        updates: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MockEngine {
        fn new() -> Self {
            Self {
                updates: Mutex::new(HashMap::new()),
            }
        }

        fn set_update(&self, document_id: &str, update: Vec<u8>) {
            self.updates
                .lock()
                .unwrap()
                .insert(document_id.to_string(), update);
        }
    }

    impl CrdtEngine for MockEngine {
        fn state_vector(&self, _document_id: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn encode_update(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.updates.lock().unwrap().get(document_id).cloned())
        }

        fn apply_update(&self, _document_id: &str, _update: &[u8]) -> Result<()> {
            Ok(())
        }

        fn is_dirty(&self, document_id: &str) -> bool {
            self.updates.lock().unwrap().contains_key(document_id)
        }
    }

    #[derive(Default)]
    struct MockTransmitter {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: AtomicBool,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl MockTransmitter {
        fn sent(&self) -> Vec<(String, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn gate(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
            gate
        }
    }

    impl UpdateTransmitter for MockTransmitter {
        fn transmit(&self, document_id: &str, update: &[u8]) -> BoxFuture<'_, Result<()>> {
            let document_id = document_id.to_string();
            let update = update.to_vec();
            Box::pin(async move {
                let gate = self.gate.lock().unwrap().clone();
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if self.fail.load(Ordering::SeqCst) {
                    return Err(SyncError::Transport("mock send failure".to_string()));
                }
                self.sent.lock().unwrap().push((document_id, update));
                Ok(())
            })
        }
    }

    struct Harness {
        service: Arc<SyncService>,
        queue: Arc<SyncQueue>,
        engine: Arc<MockEngine>,
        transmitter: Arc<MockTransmitter>,
        connectivity: Arc<ConnectivityMonitor>,
        events: Arc<EventLog>,
    }

    fn harness_with_policy(policy: RetryPolicy) -> Harness {
        let queue = Arc::new(SyncQueue::load(Arc::new(MemoryStorage::new()), policy).unwrap());
        let tracker = Arc::new(DocumentStateTracker::new());
        let engine = Arc::new(MockEngine::new());
        let transmitter = Arc::new(MockTransmitter::default());
        let connectivity = Arc::new(ConnectivityMonitor::new());
        let events = Arc::new(EventLog::default());

        let service = Arc::new(SyncService::new(
            SyncConfig::default(),
            Arc::clone(&queue),
            tracker,
            Arc::clone(&engine) as Arc<dyn CrdtEngine>,
            Arc::clone(&transmitter) as Arc<dyn UpdateTransmitter>,
            Arc::clone(&connectivity),
            Arc::clone(&events),
        ));

        Harness {
            service,
            queue,
            engine,
            transmitter,
            connectivity,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with_policy(RetryPolicy::default())
    }

    fn go_online(h: &Harness) {
        h.connectivity.report(ConnectivityState::online(LinkType::Wifi));
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn count_queue_processed(events: &[SyncEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SyncEvent::QueueProcessed { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_offline_enqueue_then_online_syncs_within_one_tick() {
        let h = harness();
        h.engine.set_update("doc1", vec![0x41]);
        h.service.enqueue_update("doc1", vec![0x41]).unwrap();

        assert_eq!(h.service.stats().pending_count, 1);

        h.service.start();
        settle().await;
        // Still offline: nothing moved
        assert_eq!(h.service.stats().pending_count, 1);
        assert!(h.transmitter.sent().is_empty());

        go_online(&h);
        settle().await;

        assert_eq!(h.service.stats().pending_count, 0);
        assert_eq!(h.transmitter.sent(), vec![("doc1".to_string(), vec![0x41])]);

        let events = h.events.snapshot();
        assert_eq!(
            events,
            vec![
                SyncEvent::Online,
                SyncEvent::Started {
                    document_id: "doc1".to_string()
                },
                SyncEvent::Success {
                    document_id: "doc1".to_string()
                },
                SyncEvent::QueueProcessed {
                    synced: 1,
                    failed: 0
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_to_online_triggers_exactly_one_drain() {
        let h = harness();
        h.service.start();
        settle().await;

        go_online(&h);
        settle().await;

        // Exactly one immediate drain, no timer tick has fired yet
        assert_eq!(count_queue_processed(&h.events.snapshot()), 1);

        // The periodic worker resumes on its normal schedule
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        settle().await;
        assert!(count_queue_processed(&h.events.snapshot()) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_halts_timers_without_losing_items() {
        let h = harness();
        h.service.start();
        go_online(&h);
        settle().await;
        let drains_while_online = count_queue_processed(&h.events.snapshot());

        h.connectivity.report(ConnectivityState::offline());
        settle().await;
        h.service.enqueue_update("doc1", vec![1]).unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;

        // No drains while offline, the queue is intact
        assert_eq!(count_queue_processed(&h.events.snapshot()), drains_while_online);
        assert_eq!(h.service.stats().pending_count, 1);
        assert!(h.events.snapshot().contains(&SyncEvent::Offline));
    }

    #[tokio::test]
    async fn test_worker_tick_does_not_overlap() {
        let h = harness();
        go_online(&h);
        h.engine.set_update("doc1", vec![1]);
        h.service.enqueue_update("doc1", vec![1]).unwrap();

        let gate = h.transmitter.gate();
        let service = Arc::clone(&h.service);
        let first = tokio::spawn(async move { service.process_queue().await });
        settle().await;

        // Second tick while the first is mid-flight: skipped entirely
        h.service.process_queue().await;
        assert_eq!(count_queue_processed(&h.events.snapshot()), 0);

        gate.notify_one();
        first.await.unwrap();

        assert_eq!(h.transmitter.sent().len(), 1);
        assert_eq!(count_queue_processed(&h.events.snapshot()), 1);
    }

    #[tokio::test]
    async fn test_single_flight_per_document_across_paths() {
        let h = harness();
        go_online(&h);
        h.engine.set_update("doc1", vec![1]);
        h.service.enqueue_update("doc1", vec![1]).unwrap();

        let gate = h.transmitter.gate();
        let service = Arc::clone(&h.service);
        let worker = tokio::spawn(async move { service.process_queue().await });
        settle().await;

        // The sweep sees doc1 dirty but mid-sync on the worker path
        h.service.sweep_dirty().await;

        gate.notify_one();
        worker.await.unwrap();

        // Exactly one transmission for the document, not two
        assert_eq!(h.transmitter.sent().len(), 1);
        let started = h
            .events
            .snapshot()
            .iter()
            .filter(|e| matches!(e, SyncEvent::Started { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_type_is_terminal() {
        let h = harness();
        go_online(&h);
        let id = h
            .queue
            .enqueue("widget", "w1", QueueOperation::Update, vec![], 0)
            .unwrap();

        h.service.process_queue().await;

        let item = h.queue.get(id).unwrap();
        assert_eq!(item.status, crate::types::QueueItemStatus::Failed);
        // Non-retryable: no retry slot consumed
        assert_eq!(item.retry_count, 0);

        let events = h.events.snapshot();
        assert!(events.contains(&SyncEvent::Error {
            document_id: "w1".to_string(),
            message: "Unknown entity type: 'widget'".to_string(),
            will_retry: false,
        }));
        assert!(events.contains(&SyncEvent::QueueProcessed {
            synced: 0,
            failed: 1
        }));
    }

    #[tokio::test]
    async fn test_transient_failure_backs_off_and_reports() {
        let h = harness();
        go_online(&h);
        h.engine.set_update("doc1", vec![1]);
        let id = h.service.enqueue_update("doc1", vec![1]).unwrap();
        h.transmitter.set_fail(true);

        h.service.process_queue().await;

        let item = h.queue.get(id).unwrap();
        assert_eq!(item.status, crate::types::QueueItemStatus::Pending);
        assert_eq!(item.retry_count, 1);
        assert!(h.events.snapshot().contains(&SyncEvent::Error {
            document_id: "doc1".to_string(),
            message: "Transport error: mock send failure".to_string(),
            will_retry: true,
        }));

        // Backing off: the immediate next tick drains nothing
        h.events.clear();
        h.service.process_queue().await;
        assert_eq!(
            h.events.snapshot(),
            vec![SyncEvent::QueueProcessed {
                synced: 0,
                failed: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_item_with_nothing_to_sync_succeeds_trivially() {
        let h = harness();
        go_online(&h);
        // Engine has no state for doc1
        h.service.enqueue_update("doc1", vec![1]).unwrap();

        h.service.process_queue().await;

        assert!(h.transmitter.sent().is_empty());
        assert_eq!(h.service.stats().pending_count, 0);
        assert!(h.events.snapshot().contains(&SyncEvent::Success {
            document_id: "doc1".to_string()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_syncs_dirty_documents() {
        let h = harness();
        h.service.start();
        go_online(&h);
        settle().await;

        h.engine.set_update("doc2", vec![9]);
        h.service.mark_edited("doc2");

        tokio::time::sleep(Duration::from_millis(30_100)).await;
        settle().await;

        assert!(h
            .transmitter
            .sent()
            .contains(&("doc2".to_string(), vec![9])));
        let events = h.events.snapshot();
        assert!(events.contains(&SyncEvent::Success {
            document_id: "doc2".to_string()
        }));
        assert!(events.contains(&SyncEvent::Completed));
    }

    #[tokio::test]
    async fn test_sweep_failure_keeps_document_dirty() {
        let h = harness();
        go_online(&h);
        h.engine.set_update("doc1", vec![1]);
        h.service.mark_edited("doc1");
        h.transmitter.set_fail(true);

        h.service.sweep_dirty().await;

        assert!(h.events.snapshot().contains(&SyncEvent::Error {
            document_id: "doc1".to_string(),
            message: "Transport error: mock send failure".to_string(),
            will_retry: true,
        }));

        // Still dirty: the next sweep retries it
        h.transmitter.set_fail(false);
        h.service.sweep_dirty().await;
        assert_eq!(h.transmitter.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_item_does_not_abort_batch() {
        let h = harness();
        go_online(&h);
        h.engine.set_update("doc1", vec![1]);
        h.engine.set_update("doc2", vec![2]);
        h.queue
            .enqueue("widget", "w1", QueueOperation::Update, vec![], -1)
            .unwrap();
        h.service.enqueue_update("doc1", vec![1]).unwrap();
        h.service.enqueue_update("doc2", vec![2]).unwrap();

        h.service.process_queue().await;

        // The widget failure came first (priority -1) and both documents
        // still made it out
        assert_eq!(h.transmitter.sent().len(), 2);
        assert!(h.events.snapshot().contains(&SyncEvent::QueueProcessed {
            synced: 2,
            failed: 1
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_periodic_work() {
        let h = harness();
        h.service.start();
        go_online(&h);
        settle().await;
        let drains = count_queue_processed(&h.events.snapshot());

        h.service.dispose();
        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;

        assert_eq!(count_queue_processed(&h.events.snapshot()), drains);
    }
}
