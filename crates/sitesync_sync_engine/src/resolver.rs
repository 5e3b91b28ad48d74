//! Conflict resolution.
//!
//! The resolver only computes the outcome: it never touches the queue or the
//! store. [`crate::SyncOrchestrator::resolve_conflict`] persists the result
//! and reconciles the queue so the resolved state reaches the server.

use crate::error::{SyncError, SyncResult};
use sitesync_codec::Value;
use sitesync_core::{ConflictRecord, FieldConflict, ResolutionKind, UnixMillis};

/// Decision for one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Keep the client version.
    Local,
    /// Keep the server version.
    Server,
    /// Keep a caller-supplied merge of both.
    Merge(Value),
}

impl Resolution {
    /// Builds a resolution from a strategy name and optional merged payload.
    ///
    /// # Errors
    ///
    /// Fails for an unknown strategy, for `merge` without data and for data
    /// given with another strategy.
    pub fn from_parts(strategy: &str, merged: Option<Value>) -> SyncResult<Self> {
        match (strategy, merged) {
            ("local", None) => Ok(Resolution::Local),
            ("server", None) => Ok(Resolution::Server),
            ("merge", Some(data)) => Ok(Resolution::Merge(data)),
            ("merge", None) => Err(SyncError::invalid_resolution(
                "merge requires merged data",
            )),
            ("local" | "server", Some(_)) => Err(SyncError::invalid_resolution(format!(
                "strategy `{strategy}` does not take merged data"
            ))),
            (other, _) => Err(SyncError::invalid_resolution(format!(
                "unknown strategy `{other}`"
            ))),
        }
    }

    /// Persisted kind of this resolution.
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Local => ResolutionKind::Local,
            Resolution::Server => ResolutionKind::Server,
            Resolution::Merge(_) => ResolutionKind::Merge,
        }
    }
}

/// Side picked for one field of a field-level merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Client value.
    Local,
    /// Server value.
    Server,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConflict {
    /// The record, closed.
    pub record: ConflictRecord,
    /// Entity state that should end up on the server.
    pub state: Value,
}

/// Resolves `conflict` at time `at`.
///
/// Returns `None` when the conflict is already resolved; resolving twice has
/// no effect.
pub fn resolve(
    conflict: &ConflictRecord,
    resolution: Resolution,
    at: UnixMillis,
) -> Option<ResolvedConflict> {
    if !conflict.is_active() {
        return None;
    }
    let mut record = conflict.clone();
    record.mark_resolved(resolution.kind(), at);
    let state = match resolution {
        Resolution::Local => conflict.local_data.clone(),
        Resolution::Server => conflict.server_data.clone(),
        Resolution::Merge(data) => data,
    };
    Some(ResolvedConflict { record, state })
}

/// Builds a merged payload by picking a side for each differing field.
///
/// Fields equal on both sides keep their value. A field whose picked value is
/// null is left out. When either payload is not a map, `choose` is asked once
/// with an unnamed field covering the whole value.
pub fn merge_by_field<F>(conflict: &ConflictRecord, mut choose: F) -> Value
where
    F: FnMut(&FieldConflict) -> Side,
{
    if conflict.local_data.as_map().is_none() || conflict.server_data.as_map().is_none() {
        let candidate = FieldConflict {
            field: String::new(),
            local: conflict.local_data.clone(),
            server: conflict.server_data.clone(),
        };
        return match choose(&candidate) {
            Side::Local => conflict.local_data.clone(),
            Side::Server => conflict.server_data.clone(),
        };
    }

    let mut merged = conflict.local_data.clone();
    for field in &conflict.field_conflicts {
        let picked = match choose(field) {
            Side::Local => &field.local,
            Side::Server => &field.server,
        };
        if picked.is_null() {
            if let Value::Map(pairs) = &mut merged {
                pairs.retain(|(k, _)| k.as_text() != Some(field.field.as_str()));
            }
        } else {
            merged.insert(field.field.clone(), picked.clone());
        }
    }
    merged
}
