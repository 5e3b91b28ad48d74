//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// None of these are fixed by retrying against the network; callers surface
/// them to the user as local storage problems.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A write would push the store past its byte budget.
    #[error("storage quota exceeded: {requested} bytes requested, {used} of {limit} bytes used")]
    QuotaExceeded {
        /// Bytes the rejected write needed.
        requested: u64,
        /// Bytes already in use.
        used: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Truncation target lies beyond the end of storage.
    #[error("cannot truncate to {requested} bytes, storage holds {size} bytes")]
    InvalidTruncate {
        /// The requested size.
        requested: u64,
        /// The current size.
        size: u64,
    },

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the failure comes from the byte budget rather than
    /// the device.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}
