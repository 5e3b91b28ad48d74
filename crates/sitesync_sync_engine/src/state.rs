//! Observable sync state.

use sitesync_core::{ConflictRecord, PendingSyncItem, StorageQuota, UnixMillis};
use std::fmt;

/// Connection quality reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkQuality {
    /// No measurement yet.
    #[default]
    Unknown,
    /// High latency or heavy loss.
    Poor,
    /// Usable but slow.
    Fair,
    /// No restrictions.
    Good,
}

impl NetworkQuality {
    /// Display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
        }
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the running pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncProgress {
    /// Items due when the pass started.
    pub total: usize,
    /// Items attempted so far.
    pub processed: usize,
    /// Items applied so far.
    pub succeeded: usize,
    /// Items that failed or conflicted so far.
    pub failed: usize,
    /// Item currently being replayed.
    pub current: Option<String>,
}

impl SyncProgress {
    /// Starts tracking a pass over `total` items.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Share of items attempted, in `0.0..=1.0`. An empty pass is complete.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.processed as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Point-in-time copy of the orchestrator state, handed to listeners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    /// Connectivity as last reported.
    pub is_online: bool,
    /// A pass is running.
    pub is_syncing: bool,
    /// Queue length as of the last load or mutation.
    pub pending_syncs: usize,
    /// Active conflicts as of the last load or mutation.
    pub conflict_count: usize,
    /// End of the last completed pass.
    pub last_sync_time: Option<UnixMillis>,
    /// Loaded queue, ordered for replay.
    pub sync_queue: Vec<PendingSyncItem>,
    /// Loaded active conflicts, oldest first.
    pub conflicts: Vec<ConflictRecord>,
    /// Progress of the running pass.
    pub sync_progress: Option<SyncProgress>,
    /// Connection quality.
    pub network_quality: NetworkQuality,
    /// Storage use as of the last refresh.
    pub storage_quota: Option<StorageQuota>,
}

impl SyncSnapshot {
    /// Queued items that failed with no retry scheduled.
    pub fn failed_items(&self) -> impl Iterator<Item = &PendingSyncItem> {
        self.sync_queue.iter().filter(|item| item.is_terminal())
    }

    /// Sync should be considered paused until conflicts are resolved.
    pub fn is_blocked(&self) -> bool {
        self.conflict_count > 0
    }
}

/// Counters accumulated by an executor over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Passes that got past the connectivity and conflict checks.
    pub passes: u64,
    /// Items applied.
    pub applied: u64,
    /// Items marked failed for good.
    pub failed: u64,
    /// Conflicts detected.
    pub conflicts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// End of the last pass.
    pub last_pass_at: Option<UnixMillis>,
    /// Last failure message.
    pub last_error: Option<String>,
}
