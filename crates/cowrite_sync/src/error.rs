use serde::Serialize;
use thiserror::Error;

/// Unified error type for sync engine operations
#[derive(Debug, Error)]
pub enum SyncError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(all(feature = "sqlite-store", not(target_arch = "wasm32")))]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // Transport errors
    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    // Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Queue errors
    #[error("Unknown entity type: '{0}'")]
    UnknownEntityType(String),

    // CRDT engine errors
    #[error("CRDT error: {0}")]
    Crdt(String),
}

impl SyncError {
    /// Whether a failed sync attempt carrying this error should be retried.
    ///
    /// Transport and storage failures are transient; protocol violations and
    /// unknown entity types will never succeed as-is.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Protocol(_) | SyncError::UnknownEntityType(_)
        )
    }
}

/// Result type alias for sync engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// A serializable representation of SyncError for IPC (e.g., Tauri)
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&SyncError> for SerializableError {
    fn from(err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Io(_) => "Io",
            SyncError::Json(_) => "Json",
            SyncError::Storage(_) => "Storage",
            #[cfg(all(feature = "sqlite-store", not(target_arch = "wasm32")))]
            SyncError::Sqlite(_) => "Sqlite",
            SyncError::NotConnected => "NotConnected",
            SyncError::Transport(_) => "Transport",
            SyncError::InvalidUrl(_) => "InvalidUrl",
            SyncError::Protocol(_) => "Protocol",
            SyncError::UnknownEntityType(_) => "UnknownEntityType",
            SyncError::Crdt(_) => "Crdt",
        }
        .to_string();

        Self {
            kind,
            message: err.to_string(),
        }
    }
}
