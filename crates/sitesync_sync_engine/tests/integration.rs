//! End-to-end tests: durable store, orchestrator, executor and an in-memory
//! server working together.

use sitesync_codec::Value;
use sitesync_core::{
    ConflictRecord, DurableStore, PendingSyncItem, ResolutionKind, StoreConfig, SyncOperation,
    SyncStatus,
};
use sitesync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use sitesync_sync_engine::{
    merge_by_field, ApplyOutcome, ApplyRequest, HaltReason, InMemoryRemote, RemoteApi,
    RemoteFailure, Resolution, Side, SyncConfig, SyncExecutor, SyncOrchestrator,
};
use sitesync_testkit::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn loading_five_items_reports_five_pending() {
    let store = TestStore::memory();
    for item in scenarios::queue_items(5) {
        store.put_record(&item).unwrap();
    }

    let orchestrator = SyncOrchestrator::new(Arc::clone(&store.store));
    assert_eq!(orchestrator.load_sync_queue().unwrap(), 5);
    assert_eq!(orchestrator.pending_syncs(), 5);
    assert_eq!(orchestrator.sync_queue().len(), 5);
}

#[test]
fn merging_a_loaded_conflict_closes_it_in_the_store() {
    let store = TestStore::memory();
    let conflict = scenarios::open_conflict();
    store.put_record(&conflict).unwrap();

    let orchestrator = SyncOrchestrator::new(Arc::clone(&store.store));
    orchestrator.load_conflicts().unwrap();
    assert_eq!(orchestrator.conflicts().len(), 1);
    assert_eq!(orchestrator.conflict_count(), 1);

    let merged = Value::object([
        ("status", Value::from("in_review")),
        ("assignee", Value::from("mara")),
    ]);
    assert!(orchestrator
        .resolve_conflict(&conflict.id, Resolution::Merge(merged.clone()))
        .unwrap());

    assert!(orchestrator.conflicts().is_empty());
    assert_eq!(orchestrator.conflict_count(), 0);
    let stored: ConflictRecord = store.get_record(&conflict.id).unwrap().unwrap();
    assert!(stored.resolved);
    assert_eq!(stored.resolution, Some(ResolutionKind::Merge));
    assert!(stored.resolved_at.is_some());

    // No queued item raised it, so the merge goes out as a forced update.
    let queue = orchestrator.sync_queue();
    assert_eq!(queue.len(), 1);
    assert!(queue[0].force);
    assert_eq!(queue[0].data, merged);
}

#[test]
fn removing_in_batches_of_25_empties_a_large_queue() {
    let store = scenarios::populated_queue(150);
    let orchestrator = SyncOrchestrator::new(Arc::clone(&store.store));
    orchestrator.load_sync_queue().unwrap();
    assert_eq!(orchestrator.sync_queue().len(), 150);

    let mut batches = 0;
    while !orchestrator.sync_queue().is_empty() {
        let batch: Vec<String> = orchestrator
            .sync_queue()
            .iter()
            .take(25)
            .map(|item| item.id.clone())
            .collect();
        for id in batch {
            assert!(orchestrator.remove_pending_sync(&id).unwrap());
        }
        batches += 1;
        if batches == 4 {
            assert_eq!(orchestrator.sync_queue().len(), 50);
        }
    }
    assert_eq!(batches, 6);
    assert_eq!(orchestrator.pending_syncs(), 0);
    assert!(store.is_empty(sitesync_core::SYNC_QUEUE_STORE));

    orchestrator.load_sync_queue().unwrap();
    assert_eq!(orchestrator.sync_queue().len(), 0);
}

#[test]
fn one_pass_drains_a_large_queue_in_batches() {
    let harness = SyncHarness::with_config(SyncHarness::default_config().with_batch_size(25));
    for n in 0..150 {
        harness
            .orchestrator
            .enqueue(
                "daily_reports",
                format!("r-{n}"),
                SyncOperation::Create,
                Value::object([("crew_size", Value::from(n))]),
            )
            .unwrap();
    }

    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.success, 150);
    assert_eq!(summary.remaining, 0);
    assert!(summary.is_complete());
    assert_eq!(harness.store.len(sitesync_core::SYNC_QUEUE_STORE), 0);
}

#[test]
fn sequential_updates_reach_the_server_in_order() {
    let harness = SyncHarness::new();
    harness
        .remote
        .insert_entity("tasks", "t-7", scenarios::versioned(0));
    for version in 1..=3 {
        harness
            .orchestrator
            .enqueue("tasks", "t-7", SyncOperation::Update, scenarios::versioned(version))
            .unwrap();
    }

    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.success, 3);

    let entity = harness.remote.entity("tasks", "t-7").unwrap();
    assert_eq!(entity.data.get("version"), Some(&Value::from(3)));
    let versions: Vec<_> = harness
        .remote
        .requests()
        .iter()
        .map(|r| r.data.get("version").cloned())
        .collect();
    assert_eq!(
        versions,
        vec![
            Some(Value::from(1)),
            Some(Value::from(2)),
            Some(Value::from(3))
        ]
    );
}

#[test]
fn stored_order_wins_over_insertion_order() {
    let store = TestStore::memory();
    let mut history = scenarios::entity_history("t-3", 3);
    history.reverse();
    for item in &history {
        store.put_record(item).unwrap();
    }
    let store = store.reopen();

    let orchestrator = store.orchestrator();
    orchestrator.set_online(true);
    let remote = Arc::new(sitesync_sync_engine::InMemoryRemote::new());
    remote.insert_entity("tasks", "t-3", scenarios::versioned(0));
    let executor = SyncExecutor::new(SyncHarness::default_config(), Arc::clone(&remote));
    executor.run_at(&orchestrator, 0).unwrap();

    let ids: Vec<String> = remote.requests().into_iter().map(|r| r.item_id).collect();
    assert_eq!(ids, vec!["t-3-v1", "t-3-v2", "t-3-v3"]);
    assert_eq!(
        remote.entity("tasks", "t-3").unwrap().data,
        scenarios::versioned(3)
    );
}

#[test]
fn failed_item_metadata_survives_the_store() {
    let store = TestStore::file();
    let item = scenarios::failed_item(3);
    store.put_record(&item).unwrap();
    let store = store.reopen();

    let orchestrator = SyncOrchestrator::new(Arc::clone(&store.store));
    orchestrator.load_sync_queue().unwrap();
    let queue = orchestrator.sync_queue();
    assert_eq!(queue[0].retry_count, 3);
    assert_eq!(queue[0].status, SyncStatus::Failed);
    assert_eq!(queue[0], item);
}

#[test]
fn server_edit_raises_conflict_and_local_resolution_wins() {
    let harness = SyncHarness::new();
    harness.remote.insert_entity(
        "tasks",
        "t-1",
        Value::object([("status", Value::from("open"))]),
    );
    harness.remote.edit_on_server(
        "tasks",
        "t-1",
        Value::object([("status", Value::from("blocked"))]),
    );
    let local = Value::object([("status", Value::from("done"))]);
    let item = harness
        .orchestrator
        .enqueue("tasks", "t-1", SyncOperation::Update, local.clone())
        .unwrap();
    harness
        .orchestrator
        .enqueue("punch_list", "pl-1", SyncOperation::Create, Value::empty_object())
        .unwrap();

    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.halted, Some(HaltReason::Conflicts));
    assert_eq!(summary.success, 0);
    assert_eq!(harness.orchestrator.conflict_count(), 1);

    let conflict = harness.orchestrator.conflicts().remove(0);
    assert_eq!(conflict.item_id.as_deref(), Some(item.id.as_str()));
    assert_eq!(conflict.field_conflicts.len(), 1);

    // Gated: nothing is sent while the conflict is open.
    let requests_before = harness.remote.request_count();
    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.halted, Some(HaltReason::Conflicts));
    assert_eq!(harness.remote.request_count(), requests_before);

    harness
        .orchestrator
        .resolve_conflict(&conflict.id, Resolution::Local)
        .unwrap();
    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.success, 2);
    assert!(summary.is_complete());
    assert_eq!(harness.remote.entity("tasks", "t-1").unwrap().data, local);
}

#[test]
fn server_resolution_drops_the_local_edit() {
    let harness = SyncHarness::new();
    let server = Value::object([("amount", Value::from(900))]);
    harness
        .remote
        .insert_entity("change_orders", "co-4", Value::object([("amount", Value::from(500))]));
    harness
        .remote
        .edit_on_server("change_orders", "co-4", server.clone());
    harness
        .orchestrator
        .enqueue(
            "change_orders",
            "co-4",
            SyncOperation::Update,
            Value::object([("amount", Value::from(750))]),
        )
        .unwrap();
    harness.run_at(0).unwrap();

    let conflict = harness.orchestrator.conflicts().remove(0);
    harness
        .orchestrator
        .resolve_conflict(&conflict.id, Resolution::Server)
        .unwrap();
    assert_eq!(harness.orchestrator.pending_syncs(), 0);

    let summary = harness.run_at(0).unwrap();
    assert!(summary.is_complete());
    assert_eq!(
        harness.remote.entity("change_orders", "co-4").unwrap().data,
        server
    );
}

#[test]
fn field_merge_is_pushed_over_the_server_version() {
    let harness = SyncHarness::new();
    harness.remote.insert_entity(
        "daily_reports",
        "r-2",
        Value::object([("weather", Value::from("clear")), ("crew_size", Value::from(8))]),
    );
    harness.remote.edit_on_server(
        "daily_reports",
        "r-2",
        Value::object([("weather", Value::from("rain")), ("crew_size", Value::from(8))]),
    );
    harness
        .orchestrator
        .enqueue(
            "daily_reports",
            "r-2",
            SyncOperation::Update,
            Value::object([("weather", Value::from("clear")), ("crew_size", Value::from(11))]),
        )
        .unwrap();
    harness.run_at(0).unwrap();

    let conflict = harness.orchestrator.conflicts().remove(0);
    let merged = merge_by_field(&conflict, |field| match field.field.as_str() {
        "weather" => Side::Server,
        _ => Side::Local,
    });
    harness
        .orchestrator
        .resolve_conflict(&conflict.id, Resolution::Merge(merged))
        .unwrap();
    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.success, 1);

    let data = harness.remote.entity("daily_reports", "r-2").unwrap().data;
    assert_eq!(data.get("weather"), Some(&Value::from("rain")));
    assert_eq!(data.get("crew_size"), Some(&Value::from(11)));
}

#[test]
fn transient_failures_back_off_then_succeed() {
    let harness = SyncHarness::new();
    harness
        .remote
        .fail_next(2, RemoteFailure::transient("503 service unavailable"));
    let item = harness
        .orchestrator
        .enqueue("permits", "pm-2", SyncOperation::Create, Value::empty_object())
        .unwrap();

    let first = harness.run_at(10_000).unwrap();
    assert_eq!(first.deferred, 1);
    let queued = harness.store.get_record::<PendingSyncItem>(&item.id).unwrap().unwrap();
    assert_eq!(queued.retry_count, 1);
    assert_eq!(queued.next_attempt_at, Some(11_000));

    // Not due yet.
    let early = harness.run_at(10_500).unwrap();
    assert_eq!(early.deferred, 1);
    assert_eq!(harness.remote.request_count(), 1);

    let second = harness.run_at(11_000).unwrap();
    assert_eq!(second.deferred, 1);
    let queued = harness.store.get_record::<PendingSyncItem>(&item.id).unwrap().unwrap();
    assert_eq!(queued.next_attempt_at, Some(13_000));

    let third = harness.run_at(13_000).unwrap();
    assert_eq!(third.success, 1);
    assert_eq!(harness.orchestrator.pending_syncs(), 0);
}

#[test]
fn exhausted_retries_leave_a_failed_item_for_the_user() {
    let harness = SyncHarness::new();
    harness
        .remote
        .fail_next(3, RemoteFailure::transient("timeout"));
    let item = harness
        .orchestrator
        .enqueue("drawings", "d-1", SyncOperation::Create, Value::empty_object())
        .unwrap();

    harness.run_at(0).unwrap();
    harness.run_at(1_000).unwrap();
    let last = harness.run_at(3_000).unwrap();
    assert_eq!(last.failed, 1);

    let failed = harness.store.get_record::<PendingSyncItem>(&item.id).unwrap().unwrap();
    assert!(failed.is_terminal());
    assert_eq!(failed.retry_count, 3);
    assert_eq!(harness.orchestrator.snapshot().failed_items().count(), 1);

    harness.orchestrator.retry_failed(&item.id).unwrap();
    let summary = harness.run_at(3_000).unwrap();
    assert_eq!(summary.success, 1);
}

#[test]
fn failed_item_blocks_later_edits_to_the_same_entity() {
    let harness = SyncHarness::new();
    harness
        .remote
        .fail_next(1, RemoteFailure::permanent("422 invalid status"));
    harness.remote.insert_entity("tasks", "t-2", scenarios::versioned(0));
    harness
        .orchestrator
        .enqueue("tasks", "t-2", SyncOperation::Update, scenarios::versioned(1))
        .unwrap();
    harness
        .orchestrator
        .enqueue("tasks", "t-2", SyncOperation::Update, scenarios::versioned(2))
        .unwrap();
    harness
        .orchestrator
        .enqueue("tasks", "t-9", SyncOperation::Create, scenarios::versioned(1))
        .unwrap();

    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.remaining, 2);
    assert_eq!(
        harness.remote.entity("tasks", "t-2").unwrap().data,
        scenarios::versioned(0)
    );
}

#[test]
fn offline_pass_is_a_no_op() {
    let harness = SyncHarness::new();
    harness
        .orchestrator
        .enqueue("projects", "p-1", SyncOperation::Create, Value::empty_object())
        .unwrap();
    harness.orchestrator.set_online(false);

    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.halted, Some(HaltReason::Offline));
    assert_eq!(summary.remaining, 1);
    assert_eq!(harness.remote.request_count(), 0);
}

#[test]
fn interrupted_attempt_is_replayed_after_restart() {
    let harness = SyncHarness::new();
    let mut item = harness
        .orchestrator
        .enqueue("invoices", "inv-1", SyncOperation::Create, Value::empty_object())
        .unwrap();
    // The process died after marking the item in flight.
    item.begin_attempt();
    harness.store.put_record(&item).unwrap();

    let harness = harness.restart();
    assert_eq!(harness.orchestrator.sync_queue()[0].status, SyncStatus::InProgress);
    let summary = harness.run_at(0).unwrap();
    assert_eq!(summary.success, 1);
}

#[test]
fn torn_tail_loses_only_the_last_enqueue() {
    let store = TestStore::memory();
    let orchestrator = store.orchestrator();
    orchestrator
        .enqueue("tasks", "t-1", SyncOperation::Create, Value::empty_object())
        .unwrap();
    orchestrator
        .enqueue("tasks", "t-2", SyncOperation::Create, Value::empty_object())
        .unwrap();
    drop(orchestrator);

    let store = store.reopen_truncated(3);
    let orchestrator = store.orchestrator();
    assert_eq!(orchestrator.pending_syncs(), 1);
    assert_eq!(orchestrator.sync_queue()[0].entity_id, "t-1");
}

#[test]
fn storage_failure_during_a_pass_is_returned() {
    let (backend, switch) = CrashingBackend::new(InMemoryBackend::new());
    let store = Arc::new(DurableStore::open_with_backend(backend, StoreConfig::default()).unwrap());
    let orchestrator = SyncOrchestrator::new(store);
    orchestrator.set_online(true);
    orchestrator
        .enqueue("permits", "pm-1", SyncOperation::Create, Value::empty_object())
        .unwrap();

    switch.crash_now();
    let executor = SyncExecutor::new(SyncConfig::new(), sitesync_sync_engine::InMemoryRemote::new());
    let err = executor.run_at(&orchestrator, 0).unwrap_err();
    assert!(err.is_storage_failure());
    assert!(!orchestrator.is_syncing());
    assert_eq!(executor.remote().request_count(), 0);
}

#[test]
fn quota_exhaustion_surfaces_on_enqueue() {
    let store = TestStore::memory_with_config(StoreConfig::default().quota_bytes(512));
    let orchestrator = store.orchestrator();
    let payload = Value::object([("notes", Value::from("x".repeat(200)))]);

    let mut result = Ok(());
    for n in 0..10 {
        result = orchestrator
            .enqueue("daily_reports", format!("r-{n}"), SyncOperation::Create, payload.clone())
            .map(|_| ());
        if result.is_err() {
            break;
        }
    }
    let err = result.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(orchestrator.pending_syncs(), store.len(sitesync_core::SYNC_QUEUE_STORE));
}

#[test]
fn subscribers_see_the_pass() {
    let harness = SyncHarness::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = harness.orchestrator.subscribe(move |snapshot| {
        sink.lock().push((snapshot.is_syncing, snapshot.pending_syncs));
    });
    harness
        .orchestrator
        .enqueue("tasks", "t-1", SyncOperation::Create, Value::empty_object())
        .unwrap();
    harness.run_at(0).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.first(), Some(&(false, 1)));
    assert!(seen.iter().any(|(syncing, _)| *syncing));
    assert_eq!(seen.last(), Some(&(false, 0)));
}

/// Fails every write to the conflicts store while armed.
#[derive(Debug)]
struct RejectsConflictWrites {
    inner: InMemoryBackend,
    armed: Arc<AtomicBool>,
}

impl StorageBackend for RejectsConflictWrites {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        // CBOR text header for a 9-byte string, then the store name.
        let needle = b"\x69conflicts";
        if self.armed.load(Ordering::SeqCst) && data.windows(needle.len()).any(|w| w == needle) {
            return Err(StorageError::Io(std::io::Error::other("conflicts store offline")));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace_all(&mut self, data: &[u8]) -> StorageResult<()> {
        self.inner.replace_all(data)
    }
}

/// Answers like [`InMemoryRemote`], a little slower.
struct SlowRemote(InMemoryRemote);

impl RemoteApi for SlowRemote {
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        thread::sleep(Duration::from_millis(2));
        self.0.apply(request)
    }
}

/// Removes the item from the queue while its request is on the wire.
struct UserRemovesMidRequest {
    orchestrator: Arc<SyncOrchestrator>,
    outcome: ApplyOutcome,
}

impl RemoteApi for UserRemovesMidRequest {
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        self.orchestrator.remove_pending_sync(&request.item_id).unwrap();
        self.outcome.clone()
    }
}

fn conflicted_items(store: &TestStore, count: usize) -> Vec<ConflictRecord> {
    (0..count)
        .map(|n| {
            let item = PendingSyncItem::new(
                "tasks",
                format!("t-{n}"),
                SyncOperation::Update,
                Value::object([("status", Value::from("done"))]),
            );
            store.put_record(&item).unwrap();
            let conflict = ConflictRecord::for_item(
                &item,
                Value::object([("status", Value::from("blocked"))]),
                0,
            );
            store.put_record(&conflict).unwrap();
            conflict
        })
        .collect()
}

#[test]
fn concurrent_removes_of_distinct_items() {
    let store = scenarios::populated_queue(64);
    let orchestrator = Arc::new(store.orchestrator());
    let ids: Vec<String> = orchestrator.sync_queue().into_iter().map(|i| i.id).collect();

    thread::scope(|scope| {
        for chunk in ids.chunks(16) {
            let orchestrator = Arc::clone(&orchestrator);
            scope.spawn(move || {
                for id in chunk {
                    assert!(orchestrator.remove_pending_sync(id).unwrap());
                }
            });
        }
    });

    assert_eq!(orchestrator.pending_syncs(), 0);
    assert_eq!(store.len(sitesync_core::SYNC_QUEUE_STORE), 0);
    drop(orchestrator);
    assert_eq!(store.reopen().orchestrator().pending_syncs(), 0);
}

#[test]
fn concurrent_removes_of_one_item_succeed_once() {
    let store = scenarios::populated_queue(3);
    let orchestrator = Arc::new(store.orchestrator());
    let target = orchestrator.sync_queue()[1].id.clone();
    let removed = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                if orchestrator.remove_pending_sync(&target).unwrap() {
                    removed.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(removed.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.pending_syncs(), 2);
    assert_eq!(store.len(sitesync_core::SYNC_QUEUE_STORE), 2);
    assert!(orchestrator.sync_queue().iter().all(|item| item.id != target));
}

#[test]
fn concurrent_resolutions_of_distinct_conflicts() {
    let store = TestStore::memory();
    let conflicts = conflicted_items(&store, 12);
    let orchestrator = Arc::new(store.orchestrator());
    assert_eq!(orchestrator.conflict_count(), 12);

    thread::scope(|scope| {
        for (n, conflict) in conflicts.iter().enumerate() {
            let orchestrator = Arc::clone(&orchestrator);
            scope.spawn(move || {
                let resolution = if n % 2 == 0 {
                    Resolution::Local
                } else {
                    Resolution::Server
                };
                assert!(orchestrator.resolve_conflict(&conflict.id, resolution).unwrap());
            });
        }
    });

    assert_eq!(orchestrator.conflict_count(), 0);
    let queue = orchestrator.sync_queue();
    assert_eq!(queue.len(), 6);
    assert!(queue.iter().all(|item| item.force));
    for conflict in &conflicts {
        let stored: ConflictRecord = store.get_record(&conflict.id).unwrap().unwrap();
        assert!(stored.resolved);
    }

    drop(orchestrator);
    let reopened = store.reopen().orchestrator();
    assert_eq!(reopened.conflict_count(), 0);
    assert_eq!(reopened.pending_syncs(), 6);
}

#[test]
fn removes_during_a_pass_stay_removed() {
    let store = TestStore::memory();
    let orchestrator = Arc::new(store.orchestrator());
    orchestrator.set_online(true);
    let ids: Vec<String> = (0..40)
        .map(|n| {
            let data = Value::empty_object();
            orchestrator
                .enqueue("daily_reports", format!("r-{n}"), SyncOperation::Create, data)
                .unwrap()
                .id
        })
        .collect();
    let executor = SyncExecutor::new(
        SyncConfig::new().with_batch_size(10),
        SlowRemote(InMemoryRemote::new()),
    );

    thread::scope(|scope| {
        let pass = scope.spawn(|| executor.run_at(&orchestrator, 0));
        for id in ids.iter().rev() {
            orchestrator.remove_pending_sync(id).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        pass.join().unwrap().unwrap();
    });

    assert_eq!(orchestrator.pending_syncs(), 0);
    assert_eq!(store.len(sitesync_core::SYNC_QUEUE_STORE), 0);
    assert!(!orchestrator.is_syncing());
    drop(orchestrator);
    assert_eq!(store.reopen().orchestrator().pending_syncs(), 0);
}

#[test]
fn item_removed_mid_request_is_not_written_back() {
    let outcomes = [
        ApplyOutcome::Failed(RemoteFailure::transient("timeout")),
        ApplyOutcome::Failed(RemoteFailure::permanent("400")),
        ApplyOutcome::Conflict {
            server_data: Value::object([("status", Value::from("blocked"))]),
        },
    ];
    for outcome in outcomes {
        let store = TestStore::memory();
        let orchestrator = Arc::new(store.orchestrator());
        orchestrator.set_online(true);
        orchestrator
            .enqueue("tasks", "t-1", SyncOperation::Update, Value::empty_object())
            .unwrap();
        let executor = SyncExecutor::new(
            SyncHarness::default_config(),
            UserRemovesMidRequest {
                orchestrator: Arc::clone(&orchestrator),
                outcome,
            },
        );

        executor.run_at(&orchestrator, 0).unwrap();
        assert_eq!(orchestrator.pending_syncs(), 0);
        assert_eq!(orchestrator.conflict_count(), 0);
        drop(executor);
        drop(orchestrator);
        let reopened = store.reopen();
        assert_eq!(reopened.len(sitesync_core::SYNC_QUEUE_STORE), 0);
        assert_eq!(reopened.len(sitesync_core::CONFLICTS_STORE), 0);
    }
}

#[test]
fn failed_resolution_leaves_the_queue_as_it_was() {
    let disk = InMemoryBackend::new();
    let armed = Arc::new(AtomicBool::new(false));
    let backend = RejectsConflictWrites {
        inner: disk,
        armed: Arc::clone(&armed),
    };
    let store = Arc::new(DurableStore::open_with_backend(backend, StoreConfig::default()).unwrap());
    let item = PendingSyncItem::new(
        "tasks",
        "t-1",
        SyncOperation::Update,
        Value::object([("status", Value::from("done"))]),
    );
    store.put_record(&item).unwrap();
    let server = Value::object([("status", Value::from("blocked"))]);
    let conflict = ConflictRecord::for_item(&item, server, 0);
    store.put_record(&conflict).unwrap();
    let orphan = ConflictRecord::new("tasks", "t-2", Value::empty_object(), Value::empty_object());
    store.put_record(&orphan).unwrap();
    let orchestrator = SyncOrchestrator::load(Arc::clone(&store)).unwrap();

    armed.store(true, Ordering::SeqCst);
    for id in [&conflict.id, &orphan.id] {
        for resolution in [Resolution::Local, Resolution::Server] {
            assert!(orchestrator.resolve_conflict(id, resolution).is_err());
        }
    }
    let queue = orchestrator.sync_queue();
    assert_eq!(queue.len(), 1);
    assert!(!queue[0].force);
    assert_eq!(store.len(sitesync_core::SYNC_QUEUE_STORE), 1);
    assert_eq!(orchestrator.conflict_count(), 2);

    armed.store(false, Ordering::SeqCst);
    assert!(orchestrator.resolve_conflict(&conflict.id, Resolution::Local).unwrap());
    assert!(orchestrator.resolve_conflict(&orphan.id, Resolution::Local).unwrap());
    let queue = orchestrator.sync_queue();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|item| item.force));
    assert_eq!(queue.iter().filter(|i| i.entity_id == "t-1").count(), 1);
}

#[test]
fn full_store_can_still_be_cleaned_up() {
    let store = TestStore::memory_with_config(StoreConfig::default().quota_bytes(512));
    let orchestrator = store.orchestrator();
    let payload = Value::object([("notes", Value::from("x".repeat(200)))]);
    let mut ids = Vec::new();
    loop {
        let entity_id = format!("r-{}", ids.len());
        match orchestrator.enqueue("daily_reports", entity_id, SyncOperation::Create, payload.clone()) {
            Ok(item) => ids.push(item.id),
            Err(e) => {
                assert!(e.is_quota_exceeded());
                break;
            }
        }
    }
    assert!(!ids.is_empty());
    let tiny = Value::empty_object();
    while orchestrator.enqueue("tasks", "t", SyncOperation::Delete, tiny.clone()).is_ok() {}

    assert!(orchestrator.remove_pending_sync(&ids[0]).unwrap());
    assert!(orchestrator.clear_sync_queue().unwrap() > 0);
    assert_eq!(orchestrator.pending_syncs(), 0);
    assert_eq!(store.len(sitesync_core::SYNC_QUEUE_STORE), 0);

    orchestrator
        .enqueue("daily_reports", "r-new", SyncOperation::Create, payload)
        .unwrap();
    drop(orchestrator);
    assert_eq!(store.reopen().orchestrator().pending_syncs(), 1);
}
