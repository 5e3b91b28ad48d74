//! Error types for the sync engine.

use sitesync_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Per-item replay failures are not errors: the executor records them on the
/// queued item or as a conflict and reports them in its summary.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// A pass was requested while offline.
    #[error("cannot sync while offline")]
    Offline,

    /// A pass is already running.
    #[error("a sync pass is already running")]
    AlreadySyncing,

    /// No conflict with the given id exists.
    #[error("conflict not found: {id}")]
    ConflictNotFound {
        /// Requested conflict id.
        id: String,
    },

    /// No queued item with the given id exists.
    #[error("queued item not found: {id}")]
    ItemNotFound {
        /// Requested item id.
        id: String,
    },

    /// A resolution request could not be interpreted.
    #[error("invalid resolution: {message}")]
    InvalidResolution {
        /// What was wrong.
        message: String,
    },

    /// A mutation could not be queued as given.
    #[error("invalid item: {message}")]
    InvalidItem {
        /// What was wrong.
        message: String,
    },

    /// The background worker stopped abnormally.
    #[error("worker error: {0}")]
    Worker(String),
}

impl SyncError {
    /// Creates an invalid resolution error.
    pub fn invalid_resolution(message: impl Into<String>) -> Self {
        Self::InvalidResolution {
            message: message.into(),
        }
    }

    /// Creates an invalid item error.
    pub fn invalid_item(message: impl Into<String>) -> Self {
        Self::InvalidItem {
            message: message.into(),
        }
    }

    /// True when local storage failed; no network retry will help and the
    /// user should be asked to free space or repair the store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_storage_failure())
    }

    /// True when the store ran out of its byte budget.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_quota_exceeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_storage::StorageError;

    #[test]
    fn storage_failures_are_distinct() {
        let quota: SyncError = CoreError::from(StorageError::QuotaExceeded {
            requested: 10,
            used: 95,
            limit: 100,
        })
        .into();
        assert!(quota.is_storage_failure());
        assert!(quota.is_quota_exceeded());

        let bad = SyncError::from(CoreError::invalid_record("sync_queue", "missing field `id`"));
        assert!(!bad.is_storage_failure());
        assert!(!SyncError::Offline.is_storage_failure());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::Offline.to_string(), "cannot sync while offline");

        let err = SyncError::ConflictNotFound { id: "c-7".into() };
        assert!(err.to_string().contains("c-7"));
    }
}
