//! Store statistics.
//!
//! ```rust
//! use sitesync_codec::Value;
//! use sitesync_core::DurableStore;
//!
//! let store = DurableStore::open_in_memory().unwrap();
//! store.put("sync_queue", "a", &Value::Null).unwrap();
//! store.delete("sync_queue", "a").unwrap();
//!
//! let stats = store.stats().unwrap();
//! assert_eq!(stats.live_records, 0);
//! assert_eq!(stats.garbage_bytes(), stats.log_bytes);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters since the store was opened.
#[derive(Debug, Default)]
pub(crate) struct StoreCounters {
    puts: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
    compactions: AtomicU64,
}

impl StoreCounters {
    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> OperationCounts {
        OperationCounts {
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// Mutations performed through this handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    /// Records written.
    pub puts: u64,
    /// Records removed (no-op deletes are not counted).
    pub deletes: u64,
    /// Stores emptied.
    pub clears: u64,
    /// Log rewrites.
    pub compactions: u64,
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live records per store.
    pub stores: BTreeMap<String, usize>,
    /// Live records across all stores.
    pub live_records: usize,
    /// Records in the log, including superseded ones.
    pub log_records: u64,
    /// Size of the log.
    pub log_bytes: u64,
    /// Bytes a freshly compacted log would occupy.
    pub live_bytes: u64,
    /// Mutations since open.
    pub operations: OperationCounts,
}

impl StoreStats {
    /// Bytes held by superseded or deleted records.
    #[must_use]
    pub fn garbage_bytes(&self) -> u64 {
        self.log_bytes.saturating_sub(self.live_bytes)
    }

    /// Garbage as a fraction of the log (0 for an empty log).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn garbage_ratio(&self) -> f64 {
        if self.log_bytes == 0 {
            0.0
        } else {
            self.garbage_bytes() as f64 / self.log_bytes as f64
        }
    }
}

/// Result of a full log scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Complete, valid records.
    pub records: u64,
    /// Bytes covered by those records.
    pub valid_bytes: u64,
    /// Trailing bytes that do not form a complete record.
    pub torn_bytes: u64,
}

impl VerifyReport {
    /// True when the log has no torn tail.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.torn_bytes == 0
    }
}
