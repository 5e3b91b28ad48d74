//! Error types for the durable queue store.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the durable store and the record model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] sitesync_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] sitesync_codec::CodecError),

    /// I/O error outside the backend (lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The record log holds bytes that are not a valid record.
    #[error("log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A complete record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending record.
        offset: u64,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// Another process holds the store open.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// A stored value does not have the shape its record type expects.
    #[error("invalid {store} record: {message}")]
    InvalidRecord {
        /// Store the record was read from.
        store: String,
        /// What was wrong.
        message: String,
    },

    /// Caller passed an argument the store cannot accept.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// True when the failure lies in local storage (device, budget, lock or
    /// corrupted log) rather than in the data handed to the store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Io(_)
                | Self::StoreLocked
                | Self::LogCorruption { .. }
                | Self::ChecksumMismatch { .. }
        )
    }

    /// True when the store refused a write because its byte budget is spent.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_quota())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_storage::StorageError;

    #[test]
    fn classification() {
        let quota: CoreError = StorageError::QuotaExceeded {
            requested: 1,
            used: 1,
            limit: 1,
        }
        .into();
        assert!(quota.is_storage_failure());
        assert!(quota.is_quota_exceeded());

        let bad = CoreError::invalid_record("sync_queue", "missing field `id`");
        assert!(!bad.is_storage_failure());
        assert_eq!(
            bad.to_string(),
            "invalid sync_queue record: missing field `id`"
        );
    }
}
