//! Buffered mutations awaiting replay.

use super::fields::{int, opt_int, Fields};
use super::StoreRecord;
use crate::error::{CoreError, CoreResult};
use crate::types::{now_millis, UnixMillis, SYNC_QUEUE_STORE};
use sitesync_codec::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of mutation carried by a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOperation {
    /// The entity does not exist on the server yet.
    Create,
    /// Change fields of an existing entity.
    Update,
    /// Remove the entity.
    Delete,
}

impl SyncOperation {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(CoreError::invalid_record(
                SYNC_QUEUE_STORE,
                format!("unknown operation `{other}`"),
            )),
        }
    }
}

/// Replay state of a queued item.
///
/// ```text
/// pending -> in_progress -> done (removed)
///                        -> failed, retry scheduled -> in_progress
///                        -> failed, terminal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Waiting for its first attempt.
    Pending,
    /// Handed to the remote API.
    InProgress,
    /// Last attempt failed; see `next_attempt_at` for whether it will retry.
    Failed,
    /// Applied. Done items are removed from the queue.
    Done,
}

impl SyncStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "failed" => Ok(Self::Failed),
            "done" => Ok(Self::Done),
            other => Err(CoreError::invalid_record(
                SYNC_QUEUE_STORE,
                format!("unknown status `{other}`"),
            )),
        }
    }
}

/// Identity of the entity a mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// Collection name, e.g. `projects`.
    pub entity_type: String,
    /// Record id within the collection.
    pub entity_id: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// One buffered mutation against a named entity collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSyncItem {
    /// Unique id within the queue.
    pub id: String,
    /// Target collection.
    pub entity_type: String,
    /// Target record; may be client-generated for creates.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: SyncOperation,
    /// Payload to apply, usually a map of field names to values.
    pub data: Value,
    /// Enqueue time; orders replay of items for the same entity.
    pub timestamp: UnixMillis,
    /// Replay state.
    pub status: SyncStatus,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Earliest time of the next attempt after a transient failure.
    pub next_attempt_at: Option<UnixMillis>,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// Overwrite the server version; set when the item carries a conflict
    /// resolution.
    pub force: bool,
}

impl PendingSyncItem {
    /// Creates a pending item with a fresh id, stamped with the current time.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        data: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation,
            data,
            timestamp: now_millis(),
            status: SyncStatus::Pending,
            retry_count: 0,
            next_attempt_at: None,
            last_error: None,
            force: false,
        }
    }

    /// Replaces the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Replaces the enqueue time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: UnixMillis) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The entity this item mutates.
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
        }
    }

    /// Failed with no retry scheduled; only a user action revives it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status == SyncStatus::Failed && self.next_attempt_at.is_none()
    }

    /// Eligible for an attempt at `now`.
    ///
    /// `InProgress` counts as due: an item still marked in flight when a pass
    /// starts was interrupted by a crash.
    #[must_use]
    pub fn is_due(&self, now: UnixMillis) -> bool {
        match self.status {
            SyncStatus::Pending | SyncStatus::InProgress => true,
            SyncStatus::Failed => self.next_attempt_at.is_some_and(|at| at <= now),
            SyncStatus::Done => false,
        }
    }

    /// Marks the item as handed to the remote API.
    pub fn begin_attempt(&mut self) {
        self.status = SyncStatus::InProgress;
    }

    /// Records a transient failure and schedules the next attempt.
    pub fn schedule_retry(&mut self, at: UnixMillis, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.status = SyncStatus::Failed;
        self.next_attempt_at = Some(at);
        self.last_error = Some(error.into());
    }

    /// Records a failed attempt that will not be retried.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.status = SyncStatus::Failed;
        self.next_attempt_at = None;
        self.last_error = Some(error.into());
    }

    /// Puts the item back in line without counting a failure.
    pub fn requeue(&mut self) {
        self.status = SyncStatus::Pending;
        self.next_attempt_at = None;
    }

    /// Revives a failed item for a fresh round of attempts.
    pub fn reset(&mut self) {
        self.status = SyncStatus::Pending;
        self.retry_count = 0;
        self.next_attempt_at = None;
        self.last_error = None;
    }
}

impl StoreRecord for PendingSyncItem {
    const STORE: &'static str = SYNC_QUEUE_STORE;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::from(self.id.as_str())),
            ("entity_type", Value::from(self.entity_type.as_str())),
            ("entity_id", Value::from(self.entity_id.as_str())),
            ("operation", Value::from(self.operation.as_str())),
            ("data", self.data.clone()),
            ("timestamp", int(self.timestamp)),
            ("status", Value::from(self.status.as_str())),
            ("retry_count", Value::from(self.retry_count)),
            ("next_attempt_at", opt_int(self.next_attempt_at)),
            ("last_error", Value::from(self.last_error.clone())),
            ("force", Value::from(self.force)),
        ])
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let f = Fields::new(Self::STORE, value)?;
        Ok(Self {
            id: f.text("id")?,
            entity_type: f.text("entity_type")?,
            entity_id: f.text("entity_id")?,
            operation: f.text("operation")?.parse()?,
            data: f.value("data")?.clone(),
            timestamp: f.u64("timestamp")?,
            status: f.text("status")?.parse()?,
            retry_count: f.u32("retry_count")?,
            next_attempt_at: f.opt_u64("next_attempt_at")?,
            last_error: f.opt_text("last_error")?,
            force: f.bool_or("force", false)?,
        })
    }
}
