//! Remote API boundary.
//!
//! The executor hands each queued item to a [`RemoteApi`] and acts on the
//! [`ApplyOutcome`]. The wire format behind the trait is the implementor's
//! business; the engine only needs one of three answers.

use parking_lot::Mutex;
use sitesync_codec::Value;
use sitesync_core::{EntityKey, PendingSyncItem, SyncOperation};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// One mutation submitted to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    /// Queue item carrying the mutation.
    pub item_id: String,
    /// Target collection.
    pub entity_type: String,
    /// Target record.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: SyncOperation,
    /// Payload to apply.
    pub data: Value,
    /// Overwrite the server version even if it moved on.
    pub force: bool,
}

impl ApplyRequest {
    /// The entity this request mutates.
    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
        }
    }
}

impl From<&PendingSyncItem> for ApplyRequest {
    fn from(item: &PendingSyncItem) -> Self {
        Self {
            item_id: item.id.clone(),
            entity_type: item.entity_type.clone(),
            entity_id: item.entity_id.clone(),
            operation: item.operation,
            data: item.data.clone(),
            force: item.force,
        }
    }
}

/// How a remote failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network failure, timeout, 5xx or rate limit.
    Transient,
    /// Validation, malformed payload or authorization failure.
    Permanent,
}

impl FailureKind {
    /// Returns true if the attempt may succeed when repeated.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// A classified remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Server or transport message.
    pub message: String,
}

impl RemoteFailure {
    /// Creates a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns true if the attempt may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

/// Answer of the server to one [`ApplyRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The mutation was applied.
    Applied,
    /// The server version moved on since the client last saw it.
    Conflict {
        /// Server version of the entity.
        server_data: Value,
    },
    /// The mutation was rejected.
    Failed(RemoteFailure),
}

/// The server the executor replays queued mutations against.
///
/// Calls are blocking; implementations that talk to the network should
/// bound each call with their own timeout and report it as a transient
/// failure.
pub trait RemoteApi: Send + Sync {
    /// Submits one mutation.
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome;
}

impl<R: RemoteApi + ?Sized> RemoteApi for std::sync::Arc<R> {
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        (**self).apply(request)
    }
}

/// Server-side state of one entity in [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntity {
    /// Current payload.
    pub data: Value,
    /// Bumped on every change.
    pub version: u64,
    /// Deleted entities keep their version.
    pub deleted: bool,
}

#[derive(Debug)]
struct Slot {
    entity: ServerEntity,
    /// Version the client last wrote or was seeded with.
    client_version: u64,
}

impl Slot {
    fn diverged(&self) -> bool {
        self.entity.version != self.client_version
    }

    fn write(&mut self, data: Value, deleted: bool) {
        self.entity.data = data;
        self.entity.deleted = deleted;
        self.entity.version += 1;
        self.client_version = self.entity.version;
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    entities: BTreeMap<EntityKey, Slot>,
    scripted: VecDeque<ApplyOutcome>,
    requests: Vec<ApplyRequest>,
}

/// A reference [`RemoteApi`] holding server state in memory.
///
/// Each entity carries a version counter. Edits made through
/// [`InMemoryRemote::edit_on_server`] move the version past what the client
/// has seen; the next unforced client write to that entity is answered with
/// a conflict. Scripted outcomes are returned ahead of the normal logic,
/// one per request, without touching state.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
}

impl InMemoryRemote {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entity the client already knows about.
    pub fn insert_entity(&self, entity_type: &str, entity_id: &str, data: Value) {
        let mut state = self.state.lock();
        let slot = Self::slot(&mut state, entity_type, entity_id);
        slot.write(data, false);
    }

    /// Changes an entity behind the client's back.
    pub fn edit_on_server(&self, entity_type: &str, entity_id: &str, data: Value) {
        let mut state = self.state.lock();
        let slot = Self::slot(&mut state, entity_type, entity_id);
        slot.entity.data = data;
        slot.entity.deleted = false;
        slot.entity.version += 1;
    }

    /// Queues an outcome to return for the next request.
    pub fn push_outcome(&self, outcome: ApplyOutcome) {
        self.state.lock().scripted.push_back(outcome);
    }

    /// Queues `count` copies of a failure.
    pub fn fail_next(&self, count: usize, failure: RemoteFailure) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state
                .scripted
                .push_back(ApplyOutcome::Failed(failure.clone()));
        }
    }

    /// Current server state of an entity, deleted ones included.
    pub fn entity(&self, entity_type: &str, entity_id: &str) -> Option<ServerEntity> {
        let key = EntityKey {
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
        };
        self.state
            .lock()
            .entities
            .get(&key)
            .map(|slot| slot.entity.clone())
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ApplyRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn slot<'a>(state: &'a mut RemoteState, entity_type: &str, entity_id: &str) -> &'a mut Slot {
        let key = EntityKey {
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
        };
        state.entities.entry(key).or_insert_with(|| Slot {
            entity: ServerEntity {
                data: Value::Null,
                version: 0,
                deleted: true,
            },
            client_version: 0,
        })
    }
}

/// Applies the fields of an update payload on top of the stored ones.
fn merge_update(current: &Value, update: &Value) -> Value {
    match (current.as_map(), update.as_map()) {
        (Some(_), Some(_)) => {
            let mut merged = current.clone();
            for (name, value) in update.fields() {
                merged.insert(name, value.clone());
            }
            merged
        }
        _ => update.clone(),
    }
}

impl RemoteApi for InMemoryRemote {
    fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        if let Some(outcome) = state.scripted.pop_front() {
            return outcome;
        }

        let key = request.entity_key();
        let live = state.entities.get(&key).is_some_and(|s| !s.entity.deleted);
        if !live {
            match request.operation {
                SyncOperation::Delete => return ApplyOutcome::Applied,
                SyncOperation::Update if !request.force => {
                    return ApplyOutcome::Failed(RemoteFailure::permanent(format!(
                        "{key} does not exist"
                    )))
                }
                SyncOperation::Create | SyncOperation::Update => {}
            }
        }

        let slot = Self::slot(&mut state, &request.entity_type, &request.entity_id);
        let conflicting =
            live && (request.operation == SyncOperation::Create || slot.diverged());
        if conflicting && !request.force {
            return ApplyOutcome::Conflict {
                server_data: slot.entity.data.clone(),
            };
        }

        match request.operation {
            SyncOperation::Create => slot.write(request.data.clone(), false),
            SyncOperation::Update => {
                let data = if request.force || !live {
                    request.data.clone()
                } else {
                    merge_update(&slot.entity.data, &request.data)
                };
                slot.write(data, false);
            }
            SyncOperation::Delete => slot.write(Value::Null, true),
        }
        ApplyOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(op: SyncOperation, data: Value) -> ApplyRequest {
        ApplyRequest {
            item_id: "q-1".into(),
            entity_type: "tasks".into(),
            entity_id: "t-1".into(),
            operation: op,
            data,
            force: false,
        }
    }

    #[test]
    fn create_then_update_merges_fields() {
        let remote = InMemoryRemote::new();
        let created = Value::object([("title", Value::from("Frame walls")), ("done", Value::from(false))]);
        assert_eq!(
            remote.apply(&request(SyncOperation::Create, created)),
            ApplyOutcome::Applied
        );
        let update = Value::object([("done", Value::from(true))]);
        assert_eq!(
            remote.apply(&request(SyncOperation::Update, update)),
            ApplyOutcome::Applied
        );

        let entity = remote.entity("tasks", "t-1").unwrap();
        assert_eq!(entity.version, 2);
        assert_eq!(entity.data.get("title"), Some(&Value::from("Frame walls")));
        assert_eq!(entity.data.get("done"), Some(&Value::from(true)));
        assert_eq!(remote.request_count(), 2);
    }

    #[test]
    fn server_edit_causes_conflict_until_forced() {
        let remote = InMemoryRemote::new();
        remote.insert_entity("tasks", "t-1", Value::object([("done", Value::from(false))]));
        let server = Value::object([("done", Value::from(false)), ("owner", Value::from("ana"))]);
        remote.edit_on_server("tasks", "t-1", server.clone());

        let mut req = request(SyncOperation::Update, Value::object([("done", Value::from(true))]));
        assert_eq!(
            remote.apply(&req),
            ApplyOutcome::Conflict {
                server_data: server
            }
        );

        req.force = true;
        assert_eq!(remote.apply(&req), ApplyOutcome::Applied);
        let entity = remote.entity("tasks", "t-1").unwrap();
        assert_eq!(entity.data, Value::object([("done", Value::from(true))]));

        req.force = false;
        assert_eq!(remote.apply(&req), ApplyOutcome::Applied);
    }

    #[test]
    fn update_of_missing_entity_is_permanent_and_delete_is_idempotent() {
        let remote = InMemoryRemote::new();
        match remote.apply(&request(SyncOperation::Update, Value::empty_object())) {
            ApplyOutcome::Failed(f) => assert!(!f.is_retryable()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            remote.apply(&request(SyncOperation::Delete, Value::Null)),
            ApplyOutcome::Applied
        );
    }

    #[test]
    fn scripted_outcomes_come_first() {
        let remote = InMemoryRemote::new();
        remote.fail_next(2, RemoteFailure::transient("503"));
        let req = request(SyncOperation::Create, Value::empty_object());

        assert!(matches!(remote.apply(&req), ApplyOutcome::Failed(f) if f.is_retryable()));
        assert!(matches!(remote.apply(&req), ApplyOutcome::Failed(_)));
        assert_eq!(remote.apply(&req), ApplyOutcome::Applied);
        assert_eq!(remote.requests().len(), 3);
    }

    #[test]
    fn failure_display() {
        assert_eq!(RemoteFailure::permanent("422").to_string(), "permanent: 422");
        assert!(FailureKind::Transient.is_retryable());
    }
}
