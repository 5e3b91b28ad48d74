//! The durable queue store.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::StoreLock;
use crate::log::{LogReader, LogRecord};
use crate::model::StoreRecord;
use crate::stats::{StoreCounters, StoreStats, VerifyReport};
use crate::types::StorageQuota;
use parking_lot::RwLock;
use sitesync_codec::{from_cbor, to_cbor, Value};
use sitesync_storage::{
    FileBackend, InMemoryBackend, QuotaBackend, StorageBackend, StorageResult,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A live record and the size of the `Put` that wrote it.
#[derive(Debug, Clone)]
struct Slot {
    bytes: Vec<u8>,
    framed_len: u64,
}

/// In-memory view of the log: live records per store.
#[derive(Debug, Default, Clone)]
struct Index {
    stores: BTreeMap<String, BTreeMap<String, Slot>>,
    live_bytes: u64,
    log_records: u64,
}

impl Index {
    fn apply(&mut self, record: LogRecord, framed_len: u64) {
        self.log_records += 1;
        match record {
            LogRecord::Put { store, id, value } => {
                let slot = Slot {
                    bytes: value,
                    framed_len,
                };
                if let Some(old) = self.stores.entry(store).or_default().insert(id, slot) {
                    self.live_bytes -= old.framed_len;
                }
                self.live_bytes += framed_len;
            }
            LogRecord::Delete { store, id } => {
                if let Some(records) = self.stores.get_mut(&store) {
                    if let Some(old) = records.remove(&id) {
                        self.live_bytes -= old.framed_len;
                    }
                    if records.is_empty() {
                        self.stores.remove(&store);
                    }
                }
            }
            LogRecord::Clear { store } => {
                if let Some(records) = self.stores.remove(&store) {
                    self.live_bytes -= records.values().map(|s| s.framed_len).sum::<u64>();
                }
            }
        }
    }

    fn records(&self, store: &str) -> Option<&BTreeMap<String, Slot>> {
        self.stores.get(store)
    }

    fn contains(&self, store: &str, id: &str) -> bool {
        self.records(store).is_some_and(|records| records.contains_key(id))
    }
}

struct StoreState {
    backend: Box<dyn StorageBackend>,
    index: Index,
}

impl StoreState {
    /// Appends `record` and folds it into the index.
    ///
    /// Nothing of a failed write stays in the log. A delete or clear that
    /// does not fit under the quota is applied by rewriting the log without
    /// the removed records instead, so a full store can always be emptied.
    fn write(&mut self, record: LogRecord, sync: bool) -> CoreResult<()> {
        let frame = record.frame()?;
        let start = self.backend.size()?;
        if let Err(e) = self.persist(&frame, sync) {
            // A partial frame would hide every later record from replay, and
            // a whole one would resurrect a write the caller saw fail.
            if let Err(cleanup) = self.backend.truncate(start) {
                warn!(offset = start, error = %cleanup, "could not drop failed record");
            }
            if e.is_quota() && record.is_removal() {
                debug!("log full, applying removal by rewrite");
                return self.rewrite_with(record);
            }
            return Err(e.into());
        }
        self.index.apply(record, frame.len() as u64);
        Ok(())
    }

    fn persist(&mut self, frame: &[u8], sync: bool) -> StorageResult<()> {
        self.backend.append(frame)?;
        self.backend.flush()?;
        if sync {
            self.backend.sync()?;
        }
        Ok(())
    }

    fn compact(&mut self) -> CoreResult<u64> {
        let before = self.backend.size()?;
        let (data, records) = live_log(&self.index)?;
        self.backend.replace_all(&data)?;
        self.index.log_records = records;
        Ok(before.saturating_sub(data.len() as u64))
    }

    /// Applies `record` by rewriting the log from the index it produces. The
    /// index is only replaced once the new log is in place.
    fn rewrite_with(&mut self, record: LogRecord) -> CoreResult<()> {
        let mut index = self.index.clone();
        index.apply(record, 0);
        let (data, records) = live_log(&index)?;
        self.backend.replace_all(&data)?;
        index.log_records = records;
        self.index = index;
        Ok(())
    }

    fn should_compact(&self, config: &StoreConfig) -> CoreResult<bool> {
        let size = self.backend.size()?;
        if size == 0 || size < config.compaction_min_bytes {
            return Ok(false);
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = size.saturating_sub(self.index.live_bytes) as f64 / size as f64;
        Ok(ratio > config.compaction_garbage_ratio)
    }
}

/// Durable key-value store partitioned into named stores.
///
/// Every mutation is appended to a record log before the in-memory index is
/// updated, so the log is the only source of truth after a reload. Opening a
/// store replays the log; a torn final record left by a crash is cut off.
///
/// Mutations hold the writer lock from append to index update, which makes
/// each one atomic per key. Reads share the lock.
///
/// # Example
///
/// ```rust
/// use sitesync_codec::Value;
/// use sitesync_core::DurableStore;
///
/// let store = DurableStore::open_in_memory().unwrap();
/// store.put("sync_queue", "item-1", &Value::from("payload")).unwrap();
///
/// assert_eq!(store.get("sync_queue", "item-1").unwrap(), Some(Value::from("payload")));
/// assert!(store.delete("sync_queue", "item-1").unwrap());
/// assert!(!store.delete("sync_queue", "item-1").unwrap());
/// ```
pub struct DurableStore {
    state: RwLock<StoreState>,
    config: StoreConfig,
    counters: StoreCounters,
    path: Option<PathBuf>,
    _lock: Option<StoreLock>,
}

impl DurableStore {
    /// Opens an empty store that lives only in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(InMemoryBackend::new(), StoreConfig::default())
    }

    /// Opens (or creates) a store backed by the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another handle has the file
    /// open, or a corruption error if the log cannot be replayed.
    pub fn open_file(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let lock = StoreLock::acquire(path)?;
        let backend = FileBackend::open(path)?;
        let mut store = Self::open_with_backend(backend, config)?;
        store.path = Some(path.to_path_buf());
        store._lock = Some(lock);
        Ok(store)
    }

    /// Opens a store on an arbitrary backend, replaying whatever it holds.
    pub fn open_with_backend<B>(backend: B, config: StoreConfig) -> CoreResult<Self>
    where
        B: StorageBackend + 'static,
    {
        let backend: Box<dyn StorageBackend> = match config.quota_bytes {
            Some(limit) => Box::new(QuotaBackend::new(backend, limit)),
            None => Box::new(backend),
        };
        let state = replay(backend)?;
        debug!(
            stores = state.index.stores.len(),
            records = state.index.log_records,
            "opened durable store"
        );

        Ok(Self {
            state: RwLock::new(state),
            config,
            counters: StoreCounters::default(),
            path: None,
            _lock: None,
        })
    }

    /// Path of the backing file, for file stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Inserts or overwrites `id` in `store`.
    ///
    /// # Errors
    ///
    /// Fails if the value cannot be encoded or the log rejects the write
    /// (for example [`sitesync_storage::StorageError::QuotaExceeded`]); the
    /// store is unchanged in that case.
    pub fn put(&self, store: &str, id: &str, value: &Value) -> CoreResult<()> {
        check_name("store", store)?;
        check_name("id", id)?;
        let record = LogRecord::Put {
            store: store.to_owned(),
            id: id.to_owned(),
            value: to_cbor(value)?,
        };

        self.state.write().write(record, self.config.sync_on_write)?;
        self.counters.record_put();
        Ok(())
    }

    /// Overwrites `id` in `store` only if it is there. Returns false, writing
    /// nothing, if it is not.
    ///
    /// The check and the write happen under one lock, so a record removed
    /// concurrently is never brought back.
    pub fn put_if_present(&self, store: &str, id: &str, value: &Value) -> CoreResult<bool> {
        let record = LogRecord::Put {
            store: store.to_owned(),
            id: id.to_owned(),
            value: to_cbor(value)?,
        };

        let mut state = self.state.write();
        if !state.index.contains(store, id) {
            return Ok(false);
        }
        state.write(record, self.config.sync_on_write)?;
        self.counters.record_put();
        Ok(true)
    }

    /// Returns the record stored under `id`, if any.
    pub fn get(&self, store: &str, id: &str) -> CoreResult<Option<Value>> {
        let state = self.state.read();
        state
            .index
            .records(store)
            .and_then(|records| records.get(id))
            .map(|slot| from_cbor(&slot.bytes).map_err(CoreError::from))
            .transpose()
    }

    /// Returns every record in `store`, ordered by id.
    pub fn get_all(&self, store: &str) -> CoreResult<Vec<(String, Value)>> {
        let state = self.state.read();
        let Some(records) = state.index.records(store) else {
            return Ok(Vec::new());
        };
        records
            .iter()
            .map(|(id, slot)| -> CoreResult<(String, Value)> {
                Ok((id.clone(), from_cbor(&slot.bytes)?))
            })
            .collect()
    }

    /// Removes `id` from `store`. Returns false, writing nothing, if it was
    /// not there.
    pub fn delete(&self, store: &str, id: &str) -> CoreResult<bool> {
        let mut state = self.state.write();
        if !state.index.contains(store, id) {
            return Ok(false);
        }

        let record = LogRecord::Delete {
            store: store.to_owned(),
            id: id.to_owned(),
        };
        state.write(record, self.config.sync_on_write)?;
        self.counters.record_delete();
        self.maybe_compact(&mut state);
        Ok(true)
    }

    /// Removes every record in `store`. Emptying an empty store writes
    /// nothing.
    pub fn clear(&self, store: &str) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.index.records(store).is_none() {
            return Ok(());
        }

        let record = LogRecord::Clear {
            store: store.to_owned(),
        };
        state.write(record, self.config.sync_on_write)?;
        self.counters.record_clear();
        self.maybe_compact(&mut state);
        Ok(())
    }

    /// Number of records in `store`.
    #[must_use]
    pub fn len(&self, store: &str) -> usize {
        self.state.read().index.records(store).map_or(0, BTreeMap::len)
    }

    /// True if `store` holds no records.
    #[must_use]
    pub fn is_empty(&self, store: &str) -> bool {
        self.len(store) == 0
    }

    /// True if `store` holds `id`.
    #[must_use]
    pub fn contains(&self, store: &str, id: &str) -> bool {
        self.state.read().index.contains(store, id)
    }

    /// Names of the stores that hold at least one record.
    #[must_use]
    pub fn stores(&self) -> Vec<String> {
        self.state.read().index.stores.keys().cloned().collect()
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let state = self.state.read();
        let stores: BTreeMap<String, usize> = state
            .index
            .stores
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();
        Ok(StoreStats {
            live_records: stores.values().sum(),
            stores,
            log_records: state.index.log_records,
            log_bytes: state.backend.size()?,
            live_bytes: state.index.live_bytes,
            operations: self.counters.snapshot(),
        })
    }

    /// Bytes used by the log and the budget it runs under.
    pub fn storage_quota(&self) -> CoreResult<StorageQuota> {
        let state = self.state.read();
        Ok(StorageQuota {
            used_bytes: state.backend.size()?,
            limit_bytes: state.backend.limit(),
        })
    }

    /// Rewrites the log with one record per live entry. Returns the bytes
    /// reclaimed. Logical contents are unchanged.
    pub fn compact(&self) -> CoreResult<u64> {
        let mut state = self.state.write();
        let reclaimed = state.compact()?;
        self.counters.record_compaction();
        info!(reclaimed, records = state.index.log_records, "compacted store log");
        Ok(reclaimed)
    }

    /// Scans the whole log, checking framing, checksums and that every
    /// stored value decodes.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        let state = self.state.read();
        let mut reader = LogReader::new(&*state.backend)?;
        let mut records = 0;
        for entry in reader.by_ref() {
            let entry = entry?;
            if let LogRecord::Put { value, .. } = &entry.record {
                from_cbor(value).map_err(|e| {
                    CoreError::log_corruption(entry.offset, format!("undecodable value: {e}"))
                })?;
            }
            records += 1;
        }
        Ok(VerifyReport {
            records,
            valid_bytes: reader.valid_end(),
            torn_bytes: reader.torn_bytes(),
        })
    }

    /// Forces buffered writes to the device.
    pub fn sync(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.backend.flush()?;
        state.backend.sync()?;
        Ok(())
    }

    fn maybe_compact(&self, state: &mut StoreState) {
        match state.should_compact(&self.config) {
            Ok(false) => {}
            Ok(true) => match state.compact() {
                Ok(reclaimed) => {
                    self.counters.record_compaction();
                    debug!(reclaimed, "auto-compacted store log");
                }
                Err(e) => warn!(error = %e, "auto-compaction failed; log left as is"),
            },
            Err(e) => warn!(error = %e, "could not size log for compaction"),
        }
    }

    /// Writes a typed record into its store.
    pub fn put_record<R: StoreRecord>(&self, record: &R) -> CoreResult<()> {
        self.put(R::STORE, record.record_id(), &record.to_value())
    }

    /// Overwrites a typed record if it is still stored.
    pub fn update_record<R: StoreRecord>(&self, record: &R) -> CoreResult<bool> {
        self.put_if_present(R::STORE, record.record_id(), &record.to_value())
    }

    /// Reads a typed record.
    pub fn get_record<R: StoreRecord>(&self, id: &str) -> CoreResult<Option<R>> {
        self.get(R::STORE, id)?
            .map(|value| R::from_value(&value))
            .transpose()
    }

    /// Reads every record of a type, ordered by id.
    pub fn all_records<R: StoreRecord>(&self) -> CoreResult<Vec<R>> {
        self.get_all(R::STORE)?
            .iter()
            .map(|(_, value)| R::from_value(value))
            .collect()
    }

    /// Removes a typed record.
    pub fn delete_record<R: StoreRecord>(&self, id: &str) -> CoreResult<bool> {
        self.delete(R::STORE, id)
    }

    /// Removes every record of a type.
    pub fn clear_records<R: StoreRecord>(&self) -> CoreResult<()> {
        self.clear(R::STORE)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One `Put` frame per live record.
fn live_log(index: &Index) -> CoreResult<(Vec<u8>, u64)> {
    let mut data = Vec::with_capacity(usize::try_from(index.live_bytes).unwrap_or(0));
    let mut records = 0;
    for (store, entries) in &index.stores {
        for (id, slot) in entries {
            let record = LogRecord::Put {
                store: store.clone(),
                id: id.clone(),
                value: slot.bytes.clone(),
            };
            data.extend_from_slice(&record.frame()?);
            records += 1;
        }
    }
    Ok((data, records))
}

fn check_name(what: &str, name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn replay(mut backend: Box<dyn StorageBackend>) -> CoreResult<StoreState> {
    let mut index = Index::default();
    let (valid_end, torn) = {
        let mut reader = LogReader::new(&*backend)?;
        for entry in reader.by_ref() {
            let entry = entry?;
            index.apply(entry.record, entry.len);
        }
        (reader.valid_end(), reader.torn_bytes())
    };

    if torn > 0 {
        warn!(
            offset = valid_end,
            bytes = torn,
            "truncating torn record at end of store log"
        );
        backend.truncate(valid_end)?;
    }

    Ok(StoreState { backend, index })
}
