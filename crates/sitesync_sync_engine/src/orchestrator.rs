//! Session-wide coordination of queue, conflicts and connectivity.

use crate::error::{SyncError, SyncResult};
use crate::resolver::{self, Resolution};
use crate::state::{NetworkQuality, SyncProgress, SyncSnapshot};
use parking_lot::{Mutex, RwLock};
use sitesync_codec::Value;
use sitesync_core::{
    now_millis, ConflictRecord, DurableStore, PendingSyncItem, ResolutionKind, StorageQuota,
    SyncOperation, UnixMillis, CONFLICTS_STORE, SYNC_QUEUE_STORE,
};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type Listener = Arc<dyn Fn(&SyncSnapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`SyncOrchestrator::subscribe`].
///
/// The listener stays registered until the handle is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Stops notifications to the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Token for one running pass, issued by [`SyncOrchestrator::begin_sync`].
#[derive(Debug)]
pub struct SyncPass {
    generation: u64,
}

/// How to take back a queue change when the resolved conflict cannot be
/// saved.
enum Undo {
    Restore(PendingSyncItem),
    Remove(String),
}

#[derive(Default)]
struct State {
    snapshot: SyncSnapshot,
    generation: u64,
    last_timestamp: UnixMillis,
}

impl State {
    fn set_queue(&mut self, mut items: Vec<PendingSyncItem>) {
        items.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        if let Some(latest) = items.iter().map(|i| i.timestamp).max() {
            self.last_timestamp = self.last_timestamp.max(latest);
        }
        self.snapshot.pending_syncs = items.len();
        self.snapshot.sync_queue = items;
    }

    fn upsert_item(&mut self, item: PendingSyncItem) {
        let queue = &mut self.snapshot.sync_queue;
        match queue.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => *slot = item,
            None => {
                let key = (item.timestamp, &item.id);
                let at = queue.partition_point(|i| (i.timestamp, &i.id) < key);
                queue.insert(at, item);
            }
        }
        self.snapshot.pending_syncs = queue.len();
    }

    fn remove_item(&mut self, id: &str) -> bool {
        let queue = &mut self.snapshot.sync_queue;
        let before = queue.len();
        queue.retain(|i| i.id != id);
        self.snapshot.pending_syncs = queue.len();
        queue.len() != before
    }

    fn set_conflicts(&mut self, mut conflicts: Vec<ConflictRecord>) {
        conflicts.retain(ConflictRecord::is_active);
        conflicts.sort_by(|a, b| (a.detected_at, &a.id).cmp(&(b.detected_at, &b.id)));
        self.snapshot.conflict_count = conflicts.len();
        self.snapshot.conflicts = conflicts;
    }

    fn next_timestamp(&mut self) -> UnixMillis {
        let ts = now_millis().max(self.last_timestamp.saturating_add(1));
        self.last_timestamp = ts;
        ts
    }

    fn is_current(&self, pass: &SyncPass) -> bool {
        self.snapshot.is_syncing && self.generation == pass.generation
    }
}

/// The coordination point between callers, the durable store and the
/// executor.
///
/// One orchestrator exists per session and is shared by `Arc`. Its fields
/// are a cache of the durable store: `load_sync_queue` and `load_conflicts`
/// replace them with store truth. Every state change is pushed to
/// subscribers as a [`SyncSnapshot`].
pub struct SyncOrchestrator {
    store: Arc<DurableStore>,
    state: RwLock<State>,
    listeners: Arc<Mutex<Listeners>>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over `store`. It starts offline with nothing
    /// loaded.
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self {
            store,
            state: RwLock::new(State::default()),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Creates an orchestrator and loads the queue and the conflicts.
    pub fn load(store: Arc<DurableStore>) -> SyncResult<Self> {
        let orchestrator = Self::new(store);
        orchestrator.load_sync_queue()?;
        orchestrator.load_conflicts()?;
        Ok(orchestrator)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.read().snapshot.clone()
    }

    /// Connectivity as last reported.
    pub fn is_online(&self) -> bool {
        self.state.read().snapshot.is_online
    }

    /// A pass is running.
    pub fn is_syncing(&self) -> bool {
        self.state.read().snapshot.is_syncing
    }

    /// Loaded queue length.
    pub fn pending_syncs(&self) -> usize {
        self.state.read().snapshot.pending_syncs
    }

    /// Loaded active conflict count.
    pub fn conflict_count(&self) -> usize {
        self.state.read().snapshot.conflict_count
    }

    /// Loaded queue, ordered for replay.
    pub fn sync_queue(&self) -> Vec<PendingSyncItem> {
        self.state.read().snapshot.sync_queue.clone()
    }

    /// Loaded active conflicts.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.state.read().snapshot.conflicts.clone()
    }

    /// Registers a listener called after every state change.
    ///
    /// Listeners run on the thread that made the change, after the state
    /// lock is released. They may read the orchestrator but should not block.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncSnapshot) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Records a connectivity change.
    ///
    /// Going offline during a pass ends it: `is_syncing` drops to false and
    /// the executor stops before its next item. The queue is left alone.
    pub fn set_online(&self, online: bool) {
        {
            let mut state = self.state.write();
            if state.snapshot.is_online == online {
                return;
            }
            state.snapshot.is_online = online;
            if !online && state.snapshot.is_syncing {
                state.snapshot.is_syncing = false;
                state.snapshot.sync_progress = None;
                info!("connectivity lost, cancelling sync pass");
            }
        }
        debug!(online, "connectivity changed");
        self.notify();
    }

    /// Records the connection quality.
    pub fn set_network_quality(&self, quality: NetworkQuality) {
        {
            let mut state = self.state.write();
            if state.snapshot.network_quality == quality {
                return;
            }
            state.snapshot.network_quality = quality;
        }
        self.notify();
    }

    /// Reads storage use from the store and publishes it.
    pub fn refresh_storage_quota(&self) -> SyncResult<StorageQuota> {
        let quota = self.store.storage_quota()?;
        self.state.write().snapshot.storage_quota = Some(quota);
        self.notify();
        Ok(quota)
    }

    /// Replaces the loaded queue with the store contents.
    ///
    /// Returns the queue length.
    pub fn load_sync_queue(&self) -> SyncResult<usize> {
        let items: Vec<PendingSyncItem> = self.store.all_records()?;
        let count = items.len();
        self.state.write().set_queue(items);
        debug!(count, "loaded sync queue");
        self.notify();
        Ok(count)
    }

    /// Replaces the loaded conflicts with the active ones in the store.
    ///
    /// Returns the active conflict count.
    pub fn load_conflicts(&self) -> SyncResult<usize> {
        let conflicts: Vec<ConflictRecord> = self.store.all_records()?;
        let count = {
            let mut state = self.state.write();
            state.set_conflicts(conflicts);
            state.snapshot.conflict_count
        };
        debug!(count, "loaded conflicts");
        self.notify();
        Ok(count)
    }

    /// Queues a mutation.
    ///
    /// The item's timestamp is strictly greater than that of every item
    /// queued before it through this orchestrator, so per-entity order
    /// follows call order.
    pub fn enqueue(
        &self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        data: Value,
    ) -> SyncResult<PendingSyncItem> {
        let mut item = PendingSyncItem::new(entity_type, entity_id, operation, data);
        if item.entity_type.is_empty() || item.entity_id.is_empty() {
            return Err(SyncError::invalid_item(
                "entity type and entity id must not be empty",
            ));
        }
        item.timestamp = self.state.write().next_timestamp();
        self.store.put_record(&item)?;
        debug!(id = %item.id, entity = %item.entity_key(), op = %item.operation, "queued mutation");
        self.state.write().upsert_item(item.clone());
        self.notify();
        Ok(item)
    }

    /// Deletes a queued item. Removing a missing id is a no-op.
    ///
    /// Returns true if the item was queued.
    pub fn remove_pending_sync(&self, id: &str) -> SyncResult<bool> {
        let existed = self.drop_item(id)?;
        if existed {
            debug!(id, "removed queued item");
        }
        Ok(existed)
    }

    /// Revives an item that failed for good so the next pass retries it.
    pub fn retry_failed(&self, id: &str) -> SyncResult<PendingSyncItem> {
        let mut item = self
            .store
            .get_record::<PendingSyncItem>(id)?
            .ok_or_else(|| SyncError::ItemNotFound { id: id.to_owned() })?;
        item.reset();
        if !self.update_item(&item)? {
            return Err(SyncError::ItemNotFound { id: id.to_owned() });
        }
        info!(id, "failed item queued for retry");
        Ok(item)
    }

    /// Abandons every queued mutation. Cannot be undone.
    ///
    /// Returns the number of items dropped.
    pub fn clear_sync_queue(&self) -> SyncResult<usize> {
        let dropped = {
            let mut state = self.state.write();
            let dropped = self.store.len(SYNC_QUEUE_STORE);
            self.store.clear_records::<PendingSyncItem>()?;
            state.set_queue(Vec::new());
            dropped
        };
        info!(dropped, "sync queue cleared");
        self.notify();
        Ok(dropped)
    }

    /// Resolves a conflict and makes sure the resolved state is what reaches
    /// the server.
    ///
    /// - `Server` drops the queued item that raised the conflict.
    /// - `Local` keeps that item and marks it to overwrite the server.
    /// - `Merge` replaces its payload with the merged data and marks it to
    ///   overwrite the server.
    ///
    /// If the item is no longer queued, `Local` and `Merge` queue a fresh
    /// forced update. Returns false, changing nothing, when the conflict is
    /// already resolved.
    ///
    /// # Errors
    ///
    /// [`SyncError::ConflictNotFound`] for an unknown id; store errors.
    pub fn resolve_conflict(&self, id: &str, resolution: Resolution) -> SyncResult<bool> {
        let conflict = self
            .store
            .get_record::<ConflictRecord>(id)?
            .ok_or_else(|| SyncError::ConflictNotFound { id: id.to_owned() })?;
        let kind = resolution.kind();
        let Some(resolved) = resolver::resolve(&conflict, resolution, now_millis()) else {
            debug!(id, "conflict already resolved");
            return Ok(false);
        };

        let queued = match &conflict.item_id {
            Some(item_id) => self.store.get_record::<PendingSyncItem>(item_id)?,
            None => None,
        };
        if kind == ResolutionKind::Server {
            // Saved before the item is dropped, so a failed save leaves the
            // queue untouched.
            self.store.put_record(&resolved.record)?;
            if let Some(item) = queued {
                self.drop_item(&item.id)?;
            }
        } else {
            let undo = self.queue_resolution(&conflict, kind, queued, &resolved.state)?;
            if let Err(e) = self.store.put_record(&resolved.record) {
                self.undo_resolution(undo);
                return Err(e.into());
            }
        }
        {
            let mut state = self.state.write();
            let remaining: Vec<ConflictRecord> = state
                .snapshot
                .conflicts
                .iter()
                .filter(|c| c.id != id)
                .cloned()
                .collect();
            state.set_conflicts(remaining);
        }
        info!(
            id,
            resolution = %kind,
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            "conflict resolved"
        );
        self.notify();
        Ok(true)
    }

    /// Deletes resolved conflicts from the store. They are kept after
    /// resolution as history until purged.
    ///
    /// Returns the number of records deleted.
    pub fn purge_resolved_conflicts(&self) -> SyncResult<usize> {
        let conflicts: Vec<ConflictRecord> = self.store.all_records()?;
        let mut purged = 0;
        for conflict in conflicts.iter().filter(|c| !c.is_active()) {
            if self.store.delete(CONFLICTS_STORE, &conflict.id)? {
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "purged resolved conflicts");
        }
        Ok(purged)
    }

    /// Puts the resolved state into the queue for `Local` and `Merge`.
    fn queue_resolution(
        &self,
        conflict: &ConflictRecord,
        kind: ResolutionKind,
        queued: Option<PendingSyncItem>,
        resolved: &Value,
    ) -> SyncResult<Undo> {
        if let Some(original) = queued {
            let mut item = original.clone();
            if kind == ResolutionKind::Merge {
                item.data = resolved.clone();
                if item.operation == SyncOperation::Delete {
                    item.operation = SyncOperation::Update;
                }
            }
            item.force = true;
            item.requeue();
            if self.update_item(&item)? {
                return Ok(Undo::Restore(original));
            }
        }

        let mut item = PendingSyncItem::new(
            conflict.entity_type.clone(),
            conflict.entity_id.clone(),
            SyncOperation::Update,
            resolved.clone(),
        );
        item.force = true;
        item.timestamp = self.state.write().next_timestamp();
        self.store.put_record(&item)?;
        let id = item.id.clone();
        self.state.write().upsert_item(item);
        Ok(Undo::Remove(id))
    }

    fn undo_resolution(&self, undo: Undo) {
        let result = match &undo {
            Undo::Restore(original) => self.update_item(original).map(drop),
            Undo::Remove(id) => self.drop_item(id).map(drop),
        };
        if let Err(e) = result {
            warn!(error = %e, "could not roll back queue after failed resolution");
        }
    }

    /// Starts a pass.
    ///
    /// # Errors
    ///
    /// [`SyncError::Offline`] when offline, [`SyncError::AlreadySyncing`]
    /// while another pass runs.
    pub fn begin_sync(&self) -> SyncResult<SyncPass> {
        let pass = {
            let mut state = self.state.write();
            if !state.snapshot.is_online {
                return Err(SyncError::Offline);
            }
            if state.snapshot.is_syncing {
                return Err(SyncError::AlreadySyncing);
            }
            state.generation += 1;
            state.snapshot.is_syncing = true;
            state.snapshot.sync_progress = None;
            SyncPass {
                generation: state.generation,
            }
        };
        self.notify();
        Ok(pass)
    }

    /// True while `pass` is still the running pass. Going offline ends it.
    pub fn is_current(&self, pass: &SyncPass) -> bool {
        self.state.read().is_current(pass)
    }

    /// Publishes progress of `pass`. Ignored once the pass has ended.
    pub fn update_progress(&self, pass: &SyncPass, progress: SyncProgress) {
        {
            let mut state = self.state.write();
            if !state.is_current(pass) {
                return;
            }
            state.snapshot.sync_progress = Some(progress);
        }
        self.notify();
    }

    /// Ends `pass`. A pass that completed stamps `last_sync_time`.
    pub fn finish_sync(&self, pass: SyncPass, completed: bool) {
        {
            let mut state = self.state.write();
            if !state.is_current(&pass) {
                return;
            }
            state.snapshot.is_syncing = false;
            state.snapshot.sync_progress = None;
            if completed {
                state.snapshot.last_sync_time = Some(now_millis());
            }
        }
        self.notify();
    }

    /// Persists a changed item if it is still queued and updates the loaded
    /// queue. Returns false, writing nothing, once the item has been removed.
    ///
    /// The store write and the cache update happen under the state lock, so
    /// a concurrent removal never sees the item come back.
    pub(crate) fn update_item(&self, item: &PendingSyncItem) -> SyncResult<bool> {
        let present = {
            let mut state = self.state.write();
            let present = self.store.update_record(item)?;
            if present {
                state.upsert_item(item.clone());
            } else {
                state.remove_item(&item.id);
            }
            present
        };
        self.notify();
        Ok(present)
    }

    /// Removes an applied item.
    pub(crate) fn complete_item(&self, id: &str) -> SyncResult<()> {
        self.drop_item(id).map(drop)
    }

    /// Deletes an item from the store and the loaded queue. Returns true if
    /// the store held it.
    fn drop_item(&self, id: &str) -> SyncResult<bool> {
        let (existed, cached) = {
            let mut state = self.state.write();
            let existed = self.store.delete_record::<PendingSyncItem>(id)?;
            (existed, state.remove_item(id))
        };
        if existed || cached {
            self.notify();
        }
        Ok(existed)
    }

    /// Persists a newly detected conflict and adds it to the active set.
    pub(crate) fn record_conflict(&self, conflict: &ConflictRecord) -> SyncResult<()> {
        self.store.put_record(conflict)?;
        {
            let mut state = self.state.write();
            let mut conflicts = state.snapshot.conflicts.clone();
            conflicts.retain(|c| c.id != conflict.id);
            conflicts.push(conflict.clone());
            state.set_conflicts(conflicts);
        }
        self.notify();
        Ok(())
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SyncOrchestrator")
            .field("is_online", &state.snapshot.is_online)
            .field("is_syncing", &state.snapshot.is_syncing)
            .field("pending_syncs", &state.snapshot.pending_syncs)
            .field("conflict_count", &state.snapshot.conflict_count)
            .finish_non_exhaustive()
    }
}
