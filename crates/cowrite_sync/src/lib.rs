//! # cowrite_sync
//!
//! Offline-first synchronization engine for the Cowrite collaborative
//! editor. The client keeps working and keeps converging whether or not the
//! network does: edits mark documents dirty, mutation intents queue
//! durably, a connectivity-aware worker retries them with exponential
//! backoff, and a real-time session exchanges CRDT updates with the server
//! over a persistent connection.
//!
//! The CRDT merge algorithm itself is external - see [`engine::CrdtEngine`].
//! This crate orchestrates *when* and *in what order* its operations run,
//! and how failures retry.
//!
//! ## Components
//!
//! - [`connectivity`] - debounced reachability monitor
//! - [`queue`] - durable pending-mutation queue over [`storage`]
//! - [`tracker`] - per-document dirty flags and single-flight claims
//! - [`transport`] - wire messages, socket seam, real-time session
//! - [`service`] - the orchestrator tying everything together
//! - [`events`] - replayable, totally ordered sync event log
//! - [`cache`] - last-known document content with byte-size accounting
//!
//! ## Wiring
//!
//! Everything is constructed explicitly and passed by handle; there are no
//! module-level singletons:
//!
//! ```ignore
//! let storage: Arc<dyn SyncStorage> = Arc::new(SqliteStorage::open(db_path)?);
//! let queue = Arc::new(SyncQueue::load(Arc::clone(&storage), config.retry)?);
//! let tracker = Arc::new(DocumentStateTracker::new());
//! let connectivity = Arc::new(ConnectivityMonitor::new());
//! let events = Arc::new(EventLog::default());
//! let session = Arc::new(RealtimeSession::new(
//!     Arc::clone(&engine),
//!     Arc::new(TokioConnector::new()),
//!     config.ping_interval(),
//! ));
//!
//! let service = Arc::new(SyncService::new(
//!     config, queue, tracker, engine, session, connectivity, events,
//! ));
//! service.start();
//! ```

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory_storage;
pub mod queue;
pub mod service;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod types;

#[cfg(all(feature = "sqlite-store", not(target_arch = "wasm32")))]
pub mod sqlite_storage;

#[cfg(feature = "crdt-yrs")]
pub mod yrs_engine;

pub use cache::DocumentCache;
pub use config::{RetryPolicy, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, LinkType};
pub use engine::CrdtEngine;
pub use error::{Result, SyncError};
pub use events::{EventLog, SyncEvent};
pub use memory_storage::MemoryStorage;
pub use queue::SyncQueue;
pub use service::{SyncService, UpdateTransmitter};
pub use storage::SyncStorage;
pub use tracker::DocumentStateTracker;
pub use transport::{
    CursorPosition, Envelope, Payload, RealtimeSession, SessionState, SocketConnector,
};
pub use types::{
    DocumentSyncState, ENTITY_DOCUMENT, QueueItemStatus, QueueOperation, QueueStats, SyncQueueItem,
    SyncStatus,
};

#[cfg(all(feature = "sqlite-store", not(target_arch = "wasm32")))]
pub use sqlite_storage::SqliteStorage;

#[cfg(feature = "crdt-yrs")]
pub use yrs_engine::YrsEngine;
