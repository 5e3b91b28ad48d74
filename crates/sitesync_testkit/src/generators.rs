//! Property-based test generators using proptest.
//!
//! Provides strategies for sync records and the schema-less payloads they
//! carry.

use proptest::prelude::*;
use sitesync_codec::Value;
use sitesync_core::{ConflictRecord, PendingSyncItem, SyncOperation, SyncStatus};

/// Strategy for collection names.
pub fn entity_type_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "projects",
        "tasks",
        "daily_reports",
        "change_orders",
        "drawings",
        "permits",
        "invoices",
    ])
    .prop_map(str::to_owned)
}

/// Strategy for entity ids drawn from a small pool, so items collide on the
/// same entity often.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|n| format!("e-{n}"))
}

/// Strategy for JSON-like payload values: text, numbers, booleans, null,
/// nested maps and arrays. Floats are finite.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9 .,-]{0,24}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(Value::object),
        ]
    })
}

/// Strategy for entity payloads: maps of field names to values.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,10}", value_strategy(), 0..6)
        .prop_map(Value::object)
}

/// Strategy for operations, weighted toward updates.
pub fn operation_strategy() -> impl Strategy<Value = SyncOperation> {
    prop_oneof![
        1 => Just(SyncOperation::Create),
        4 => Just(SyncOperation::Update),
        1 => Just(SyncOperation::Delete),
    ]
}

/// Strategy for replay states.
pub fn status_strategy() -> impl Strategy<Value = SyncStatus> {
    prop_oneof![
        Just(SyncStatus::Pending),
        Just(SyncStatus::InProgress),
        Just(SyncStatus::Failed),
    ]
}

/// Strategy for queued items with distinct ids derived from `index`.
pub fn pending_item_strategy(index: usize) -> impl Strategy<Value = PendingSyncItem> {
    (
        entity_type_strategy(),
        entity_id_strategy(),
        operation_strategy(),
        payload_strategy(),
        1_600_000_000_000u64..1_900_000_000_000,
        status_strategy(),
        0u32..10,
        any::<bool>(),
    )
        .prop_map(
            move |(entity_type, entity_id, operation, data, timestamp, status, retries, force)| {
                let mut item = PendingSyncItem::new(entity_type, entity_id, operation, data)
                    .with_id(format!("q-{index:05}"))
                    .with_timestamp(timestamp);
                item.status = status;
                item.retry_count = retries;
                item.force = force;
                if status == SyncStatus::Failed && retries % 2 == 0 {
                    item.next_attempt_at = Some(timestamp + 1_000);
                    item.last_error = Some("transient: 503".into());
                }
                item
            },
        )
}

/// Strategy for a queue of `min..max` items with distinct ids.
pub fn queue_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<PendingSyncItem>> {
    (min..max).prop_flat_map(|len| {
        (0..len)
            .map(pending_item_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for open conflicts.
pub fn conflict_strategy() -> impl Strategy<Value = ConflictRecord> {
    (
        entity_type_strategy(),
        entity_id_strategy(),
        payload_strategy(),
        payload_strategy(),
    )
        .prop_map(|(entity_type, entity_id, local, server)| {
            ConflictRecord::new(entity_type, entity_id, local, server)
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Few cases, for suites that touch files or spawn tasks.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 200,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
