//! Property tests for queue durability, per-entity ordering, the conflict
//! gate, resolution idempotence and connectivity transitions.

use proptest::prelude::*;
use sitesync_codec::Value;
use sitesync_core::{PendingSyncItem, SyncOperation, SyncStatus};
use sitesync_sync_engine::{
    ApplyOutcome, ApplyRequest, HaltReason, InMemoryRemote, NetworkQuality, RemoteApi, Resolution,
    SyncExecutor, SyncOrchestrator,
};
use sitesync_testkit::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

fn config() -> ProptestConfig {
    PropTestConfig::quick().to_proptest_config()
}

fn resolution_strategy() -> impl Strategy<Value = Resolution> {
    prop_oneof![
        Just(Resolution::Local),
        Just(Resolution::Server),
        payload_strategy().prop_map(Resolution::Merge),
    ]
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn loaded_queue_counts_distinct_ids(
        writes in prop::collection::vec((0usize..20, payload_strategy()), 0..40),
    ) {
        let store = TestStore::memory();
        let mut ids = HashSet::new();
        for (n, data) in writes {
            let item = PendingSyncItem::new("tasks", "t-1", SyncOperation::Update, data)
                .with_id(format!("q-{n}"));
            store.put_record(&item).unwrap();
            ids.insert(item.id);
        }
        let store = store.reopen();

        let orchestrator = SyncOrchestrator::new(Arc::clone(&store.store));
        let count = orchestrator.load_sync_queue().unwrap();
        prop_assert_eq!(count, ids.len());
        prop_assert_eq!(orchestrator.sync_queue().len(), ids.len());
        prop_assert_eq!(orchestrator.pending_syncs(), ids.len());
    }

    #[test]
    fn items_for_one_entity_apply_in_timestamp_order(
        history in (1i64..12).prop_flat_map(|n| Just(scenarios::entity_history("t-1", n)).prop_shuffle()),
        others in queue_strategy(0, 10),
    ) {
        let store = TestStore::memory();
        for item in &history {
            store.put_record(item).unwrap();
        }
        // Unrelated creates interleaved with the history.
        for mut item in others {
            item.entity_type = "drawings".into();
            item.entity_id = item.id.clone();
            item.operation = SyncOperation::Create;
            item.status = SyncStatus::Pending;
            item.next_attempt_at = None;
            item.force = false;
            store.put_record(&item).unwrap();
        }

        let orchestrator = store.orchestrator();
        orchestrator.set_online(true);
        let remote = Arc::new(InMemoryRemote::new());
        remote.insert_entity("tasks", "t-1", scenarios::versioned(0));
        let executor = SyncExecutor::new(SyncHarness::default_config(), Arc::clone(&remote));
        executor.run_at(&orchestrator, 0).unwrap();

        let mut expected = history.clone();
        expected.sort_by_key(|item| item.timestamp);
        let applied: Vec<String> = remote
            .requests()
            .into_iter()
            .filter(|r| r.entity_type == "tasks")
            .map(|r| r.item_id)
            .collect();
        let expected_ids: Vec<String> = expected.iter().map(|i| i.id.clone()).collect();
        prop_assert_eq!(applied, expected_ids);

        let last = expected.last().unwrap();
        prop_assert_eq!(remote.entity("tasks", "t-1").unwrap().data, last.data.clone());
    }

    #[test]
    fn nothing_completes_while_a_conflict_is_open(
        queue in queue_strategy(1, 15),
        conflict in conflict_strategy(),
        passes in 1usize..4,
    ) {
        let store = TestStore::memory();
        for item in &queue {
            store.put_record(item).unwrap();
        }
        store.put_record(&conflict).unwrap();

        let orchestrator = store.orchestrator();
        orchestrator.set_online(true);
        let executor = SyncExecutor::new(SyncHarness::default_config(), InMemoryRemote::new());
        for _ in 0..passes {
            let summary = executor.run_at(&orchestrator, u64::MAX).unwrap();
            prop_assert_eq!(summary.halted, Some(HaltReason::Conflicts));
            prop_assert_eq!(summary.success, 0);
        }
        prop_assert_eq!(executor.remote().request_count(), 0);
        prop_assert_eq!(orchestrator.pending_syncs(), queue.len());

        let before: BTreeMap<String, PendingSyncItem> =
            queue.into_iter().map(|i| (i.id.clone(), i)).collect();
        for item in orchestrator.sync_queue() {
            prop_assert_eq!(Some(&item), before.get(&item.id));
        }
    }

    #[test]
    fn resolving_twice_changes_nothing(
        conflict in conflict_strategy(),
        first in resolution_strategy(),
        second in resolution_strategy(),
    ) {
        let store = TestStore::memory();
        store.put_record(&conflict).unwrap();
        let orchestrator = store.orchestrator();
        prop_assert_eq!(orchestrator.conflict_count(), 1);

        prop_assert!(orchestrator.resolve_conflict(&conflict.id, first).unwrap());
        let queue_after_first = orchestrator.sync_queue();
        prop_assert_eq!(orchestrator.conflict_count(), 0);

        prop_assert!(!orchestrator.resolve_conflict(&conflict.id, second).unwrap());
        prop_assert_eq!(orchestrator.conflict_count(), 0);
        prop_assert!(orchestrator.conflicts().is_empty());
        prop_assert_eq!(orchestrator.sync_queue(), queue_after_first);
    }

    #[test]
    fn going_offline_ends_the_pass_and_keeps_the_queue(
        queue in queue_strategy(0, 15),
        quality in prop::sample::select(vec![
            NetworkQuality::Poor,
            NetworkQuality::Good,
        ]),
    ) {
        let store = TestStore::memory();
        for item in &queue {
            store.put_record(item).unwrap();
        }
        let orchestrator = store.orchestrator();
        orchestrator.set_online(true);
        orchestrator.set_network_quality(quality);

        let pass = orchestrator.begin_sync().unwrap();
        prop_assert!(orchestrator.is_syncing());
        let pending = orchestrator.pending_syncs();

        orchestrator.set_online(false);
        prop_assert!(!orchestrator.is_syncing());
        prop_assert!(!orchestrator.is_current(&pass));
        prop_assert_eq!(orchestrator.pending_syncs(), pending);
        prop_assert!(orchestrator.snapshot().sync_progress.is_none());

        // The stale pass can no longer touch state.
        orchestrator.finish_sync(pass, true);
        prop_assert!(orchestrator.snapshot().last_sync_time.is_none());
    }
}

/// Goes offline while handling its `after`-th request.
struct DropsConnection {
    orchestrator: Arc<SyncOrchestrator>,
    after: usize,
    inner: InMemoryRemote,
}

impl RemoteApi for DropsConnection {
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        let outcome = self.inner.apply(request);
        if self.inner.request_count() == self.after {
            self.orchestrator.set_online(false);
        }
        outcome
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn connection_drop_mid_pass_cancels_it(count in 2usize..20, after in 1usize..20) {
        let after = after.min(count - 1);
        let store = TestStore::memory();
        let orchestrator = Arc::new(store.orchestrator());
        for n in 0..count {
            orchestrator
                .enqueue("permits", format!("pm-{n}"), SyncOperation::Create, Value::empty_object())
                .unwrap();
        }
        orchestrator.set_online(true);

        let remote = DropsConnection {
            orchestrator: Arc::clone(&orchestrator),
            after,
            inner: InMemoryRemote::new(),
        };
        let executor = SyncExecutor::new(SyncHarness::default_config(), remote);
        let summary = executor.run_at(&orchestrator, 0).unwrap();

        prop_assert_eq!(summary.halted, Some(HaltReason::Cancelled));
        prop_assert_eq!(summary.success, after);
        prop_assert_eq!(orchestrator.pending_syncs(), count - after);
        prop_assert!(!orchestrator.is_syncing());
        prop_assert!(orchestrator.snapshot().last_sync_time.is_none());
    }
}
