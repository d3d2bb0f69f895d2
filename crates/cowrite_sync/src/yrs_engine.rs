//! yrs-backed CRDT engine.
//!
//! Implements [`CrdtEngine`] with one `yrs::Doc` per document id, each
//! holding a single Y.Text named "content". Local edits go through the
//! typed helpers here; remote updates arrive through `apply_update`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use yrs::{
    Doc, GetString, ReadTxn, StateVector, Text, TextRef, Transact, Update,
    updates::decoder::Decode, updates::encoder::Encode,
};

use crate::engine::CrdtEngine;
use crate::error::{Result, SyncError};

/// Name of the Y.Text holding the document content.
const CONTENT_TEXT_NAME: &str = "content";

struct DocEntry {
    doc: Doc,
    text: TextRef,
}

/// CRDT engine backed by [`yrs`].
///
/// Documents are created lazily on first access. Dirty tracking is local:
/// the typed edit helpers set the flag, `mark_clean` (called after a
/// confirmed sync) clears it. Updates applied from remote peers do not
/// dirty a document - they are already the server's state.
pub struct YrsEngine {
    docs: RwLock<HashMap<String, DocEntry>>,
    dirty: RwLock<HashSet<String>>,
}

impl YrsEngine {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            dirty: RwLock::new(HashSet::new()),
        }
    }

    fn with_entry<T>(&self, document_id: &str, f: impl FnOnce(&DocEntry) -> T) -> T {
        {
            let docs = self.docs.read().unwrap();
            if let Some(entry) = docs.get(document_id) {
                return f(entry);
            }
        }
        let mut docs = self.docs.write().unwrap();
        let entry = docs.entry(document_id.to_string()).or_insert_with(|| {
            let doc = Doc::new();
            let text = doc.get_or_insert_text(CONTENT_TEXT_NAME);
            DocEntry { doc, text }
        });
        f(entry)
    }

    /// Current content of a document ("" for an unknown document).
    pub fn text(&self, document_id: &str) -> String {
        let docs = self.docs.read().unwrap();
        match docs.get(document_id) {
            Some(entry) => {
                let txn = entry.doc.transact();
                entry.text.get_string(&txn)
            }
            None => String::new(),
        }
    }

    /// Insert text at a character position as a local edit.
    pub fn insert_text(&self, document_id: &str, index: u32, content: &str) {
        self.with_entry(document_id, |entry| {
            let mut txn = entry.doc.transact_mut();
            entry.text.insert(&mut txn, index, content);
        });
        self.dirty.write().unwrap().insert(document_id.to_string());
    }

    /// Delete a character range as a local edit.
    pub fn remove_range(&self, document_id: &str, index: u32, len: u32) {
        self.with_entry(document_id, |entry| {
            let mut txn = entry.doc.transact_mut();
            entry.text.remove_range(&mut txn, index, len);
        });
        self.dirty.write().unwrap().insert(document_id.to_string());
    }

    /// Clear the dirty flag after a confirmed sync.
    pub fn mark_clean(&self, document_id: &str) {
        self.dirty.write().unwrap().remove(document_id);
    }

    /// Drop the document handle (e.g., when the document is closed).
    pub fn close(&self, document_id: &str) {
        self.docs.write().unwrap().remove(document_id);
        self.dirty.write().unwrap().remove(document_id);
    }
}

impl Default for YrsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CrdtEngine for YrsEngine {
    fn state_vector(&self, document_id: &str) -> Result<Vec<u8>> {
        Ok(self.with_entry(document_id, |entry| {
            let txn = entry.doc.transact();
            txn.state_vector().encode_v1()
        }))
    }

    fn encode_update(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
        let docs = self.docs.read().unwrap();
        let Some(entry) = docs.get(document_id) else {
            return Ok(None);
        };
        let txn = entry.doc.transact();
        let update = txn.encode_state_as_update_v1(&StateVector::default());
        // An empty Y.js update is 2 header bytes with no operations
        if update.len() <= 2 {
            Ok(None)
        } else {
            Ok(Some(update))
        }
    }

    fn apply_update(&self, document_id: &str, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| SyncError::Crdt(format!("failed to decode update: {}", e)))?;
        self.with_entry(document_id, |entry| {
            let mut txn = entry.doc.transact_mut();
            txn.apply_update(decoded)
                .map_err(|e| SyncError::Crdt(format!("failed to apply update: {}", e)))
        })
    }

    fn is_dirty(&self, document_id: &str) -> bool {
        self.dirty.read().unwrap().contains(document_id)
    }
}
