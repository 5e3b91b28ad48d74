//! Test fixtures and store helpers.
//!
//! Provides throwaway durable stores that can be reopened to simulate an
//! application restart, and ready-made records for common scenarios.

use sitesync_codec::Value;
use sitesync_core::{
    ConflictRecord, DurableStore, PendingSyncItem, StoreConfig, SyncOperation, SyncStatus,
};
use sitesync_storage::InMemoryBackend;
use sitesync_sync_engine::SyncOrchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

enum Medium {
    Memory(InMemoryBackend),
    File { dir: TempDir, path: PathBuf },
}

/// A durable store with automatic cleanup.
///
/// Memory stores keep a handle on their bytes so a test can reopen them, or
/// cut bytes off the end first to simulate a crash mid-write.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<DurableStore>,
    medium: Medium,
    config: StoreConfig,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with_config(StoreConfig::default())
    }

    /// Creates an in-memory test store with `config`.
    pub fn memory_with_config(config: StoreConfig) -> Self {
        let backend = InMemoryBackend::new();
        let store = DurableStore::open_with_backend(backend.clone(), config.clone())
            .expect("failed to open in-memory store");
        Self {
            store: Arc::new(store),
            medium: Medium::Memory(backend),
            config,
        }
    }

    /// Creates a new file-based test store in a temporary directory.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        let path = dir.path().join("sync.sslog");
        let config = StoreConfig::default();
        let store = DurableStore::open_file(&path, config.clone()).expect("failed to open file store");
        Self {
            store: Arc::new(store),
            medium: Medium::File { dir, path },
            config,
        }
    }

    /// Returns the store path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.medium {
            Medium::File { path, .. } => Some(path),
            Medium::Memory(_) => None,
        }
    }

    /// Raw bytes of the record log.
    pub fn log_bytes(&self) -> Vec<u8> {
        match &self.medium {
            Medium::Memory(backend) => backend.data(),
            Medium::File { path, .. } => std::fs::read(path).expect("failed to read store file"),
        }
    }

    /// Closes the store and opens it again from its bytes.
    ///
    /// # Panics
    ///
    /// Panics if another handle to the store is still alive.
    pub fn reopen(self) -> Self {
        self.reopen_truncated(0)
    }

    /// Closes the store, drops the last `cut` bytes of the log and opens it
    /// again, as if the process died mid-write.
    ///
    /// # Panics
    ///
    /// Panics if another handle to the store is still alive.
    pub fn reopen_truncated(self, cut: usize) -> Self {
        let Self {
            store,
            medium,
            config,
        } = self;
        assert!(
            Arc::strong_count(&store) == 1,
            "store still shared; drop orchestrators before reopening"
        );
        drop(store);

        match medium {
            Medium::Memory(backend) => {
                let mut bytes = backend.data();
                bytes.truncate(bytes.len().saturating_sub(cut));
                let backend = InMemoryBackend::with_data(bytes);
                let store = DurableStore::open_with_backend(backend.clone(), config.clone())
                    .expect("failed to reopen in-memory store");
                Self {
                    store: Arc::new(store),
                    medium: Medium::Memory(backend),
                    config,
                }
            }
            Medium::File { dir, path } => {
                if cut > 0 {
                    let file = std::fs::OpenOptions::new()
                        .write(true)
                        .open(&path)
                        .expect("failed to open store file");
                    let len = file.metadata().expect("failed to stat store file").len();
                    file.set_len(len.saturating_sub(cut as u64))
                        .expect("failed to truncate store file");
                }
                let store =
                    DurableStore::open_file(&path, config.clone()).expect("failed to reopen file store");
                Self {
                    store: Arc::new(store),
                    medium: Medium::File { dir, path },
                    config,
                }
            }
        }
    }

    /// A fresh orchestrator over this store, with queue and conflicts loaded.
    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::load(Arc::clone(&self.store)).expect("failed to load orchestrator")
    }
}

impl std::ops::Deref for TestStore {
    type Target = DurableStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use sitesync_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     assert!(store.stores().is_empty());
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&DurableStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&DurableStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("file store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// Ready-made records for common scenarios.
pub mod scenarios {
    use super::*;

    /// Payload map with a single `version` field.
    pub fn versioned(version: i64) -> Value {
        Value::object([("version", Value::from(version))])
    }

    /// `count` updates to distinct daily reports, one millisecond apart.
    pub fn queue_items(count: usize) -> Vec<PendingSyncItem> {
        (0..count)
            .map(|n| {
                PendingSyncItem::new(
                    "daily_reports",
                    format!("r-{n}"),
                    SyncOperation::Update,
                    Value::object([
                        ("crew_size", Value::from(i64::try_from(n).unwrap_or(i64::MAX))),
                        ("weather", Value::from("clear")),
                    ]),
                )
                .with_id(format!("q-{n:04}"))
                .with_timestamp(1_700_000_000_000 + n as u64)
            })
            .collect()
    }

    /// Sequential updates to one entity carrying versions `1..=count`.
    pub fn entity_history(entity_id: &str, count: i64) -> Vec<PendingSyncItem> {
        (1..=count)
            .map(|v| {
                PendingSyncItem::new("tasks", entity_id, SyncOperation::Update, versioned(v))
                    .with_id(format!("{entity_id}-v{v}"))
                    .with_timestamp(1_700_000_000_000 + v.unsigned_abs())
            })
            .collect()
    }

    /// An item that already failed `retry_count` times for good.
    pub fn failed_item(retry_count: u32) -> PendingSyncItem {
        let mut item = PendingSyncItem::new(
            "change_orders",
            "co-1",
            SyncOperation::Update,
            Value::object([("amount", Value::from(12_500.75))]),
        );
        item.status = SyncStatus::Failed;
        item.retry_count = retry_count;
        item.last_error = Some("permanent: 422 amount exceeds budget".into());
        item
    }

    /// An open conflict over a task's status.
    pub fn open_conflict() -> ConflictRecord {
        ConflictRecord::new(
            "tasks",
            "t-1",
            Value::object([
                ("status", Value::from("done")),
                ("assignee", Value::from("mara")),
            ]),
            Value::object([
                ("status", Value::from("blocked")),
                ("assignee", Value::from("mara")),
            ]),
        )
    }

    /// A store holding `count` queued items.
    pub fn populated_queue(count: usize) -> TestStore {
        let store = TestStore::memory();
        for item in queue_items(count) {
            store.put_record(&item).expect("failed to queue item");
        }
        store
    }
}
