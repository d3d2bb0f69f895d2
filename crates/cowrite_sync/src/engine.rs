//! CRDT engine seam.
//!
//! The merge algorithm itself is an external collaborator; the sync engine
//! only orchestrates when its operations run and how failures retry. This
//! trait is everything the orchestrator and transport need from it: update
//! bytes are opaque, keyed by document id.
//!
//! The `crdt-yrs` feature ships a [`yrs`]-backed implementation
//! ([`crate::yrs_engine::YrsEngine`]); platforms embedding a different
//! merge library provide their own.

use crate::error::Result;

/// Conflict-free merge engine, keyed by document id.
///
/// Implementations own their document handles; the sync engine never sees
/// them. All byte sequences are opaque.
pub trait CrdtEngine: Send + Sync {
    /// Compact summary of which updates this replica has already seen.
    fn state_vector(&self, document_id: &str) -> Result<Vec<u8>>;

    /// Encode the document's current state as an update to send a peer.
    ///
    /// Returns `None` when there is nothing to sync (unknown document or
    /// empty state).
    fn encode_update(&self, document_id: &str) -> Result<Option<Vec<u8>>>;

    /// Merge an update received from a peer into the local document.
    fn apply_update(&self, document_id: &str, update: &[u8]) -> Result<()>;

    /// Whether the document has local changes not yet confirmed synced.
    fn is_dirty(&self, document_id: &str) -> bool;
}
