//! Shared type definitions.

use std::time::{SystemTime, UNIX_EPOCH};

/// Store holding [`crate::PendingSyncItem`] records.
pub const SYNC_QUEUE_STORE: &str = "sync_queue";

/// Store holding [`crate::ConflictRecord`] records.
pub const CONFLICTS_STORE: &str = "conflicts";

/// Milliseconds since the Unix epoch, used for every timestamp in the model.
pub type UnixMillis = u64;

/// Current wall-clock time in unix milliseconds.
///
/// A clock set before 1970 reads as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn now_millis() -> UnixMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Space used by the store and the budget it runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageQuota {
    /// Bytes currently occupied by the record log.
    pub used_bytes: u64,
    /// Maximum bytes the log may occupy, if bounded.
    pub limit_bytes: Option<u64>,
}

impl StorageQuota {
    /// Bytes still available, if bounded.
    #[must_use]
    pub fn remaining_bytes(&self) -> Option<u64> {
        self.limit_bytes
            .map(|limit| limit.saturating_sub(self.used_bytes))
    }
}
