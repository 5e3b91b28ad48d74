//! Divergences between local and server entity state.

use super::fields::{int, opt_int, Fields};
use super::item::PendingSyncItem;
use super::StoreRecord;
use crate::error::{CoreError, CoreResult};
use crate::types::{now_millis, UnixMillis, CONFLICTS_STORE};
use sitesync_codec::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Which side a resolved conflict kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionKind {
    /// The client's version won.
    Local,
    /// The server's version won.
    Server,
    /// A caller-supplied merge of both.
    Merge,
}

impl ResolutionKind {
    /// Wire name of the resolution.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "local" => Ok(Self::Local),
            "server" => Ok(Self::Server),
            "merge" => Ok(Self::Merge),
            other => Err(CoreError::invalid_record(
                CONFLICTS_STORE,
                format!("unknown resolution `{other}`"),
            )),
        }
    }
}

/// One top-level field whose value differs between the two versions.
///
/// A field absent on one side reads as [`Value::Null`] there.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    /// Field name.
    pub field: String,
    /// Client value.
    pub local: Value,
    /// Server value.
    pub server: Value,
}

/// Lists the top-level fields that differ between two map payloads.
///
/// Returns nothing when either side is not a map; the conflict then covers
/// the whole value.
#[must_use]
pub fn diff_fields(local: &Value, server: &Value) -> Vec<FieldConflict> {
    if local.as_map().is_none() || server.as_map().is_none() {
        return Vec::new();
    }
    let names: BTreeSet<&str> = local.fields().chain(server.fields()).map(|(k, _)| k).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let l = local.get(name).cloned().unwrap_or(Value::Null);
            let s = server.get(name).cloned().unwrap_or(Value::Null);
            (l != s).then(|| FieldConflict {
                field: name.to_owned(),
                local: l,
                server: s,
            })
        })
        .collect()
}

/// A detected divergence awaiting resolution.
///
/// Active while `resolved` is false. Resolution flags the record and keeps
/// it for history; a resolved conflict is never reopened.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    /// Unique id within the conflicts store.
    pub id: String,
    /// Collection of the diverging entity.
    pub entity_type: String,
    /// Id of the diverging entity.
    pub entity_id: String,
    /// Queue item whose replay detected the divergence.
    pub item_id: Option<String>,
    /// Client version.
    pub local_data: Value,
    /// Server version at detection time.
    pub server_data: Value,
    /// Top-level fields that differ.
    pub field_conflicts: Vec<FieldConflict>,
    /// Closed by a resolution.
    pub resolved: bool,
    /// Detection time.
    pub detected_at: UnixMillis,
    /// Resolution time.
    pub resolved_at: Option<UnixMillis>,
    /// Side that won.
    pub resolution: Option<ResolutionKind>,
}

impl ConflictRecord {
    /// Creates an open conflict with a fresh id, stamped with the current time.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        local_data: Value,
        server_data: Value,
    ) -> Self {
        let field_conflicts = diff_fields(&local_data, &server_data);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            item_id: None,
            local_data,
            server_data,
            field_conflicts,
            resolved: false,
            detected_at: now_millis(),
            resolved_at: None,
            resolution: None,
        }
    }

    /// Creates the conflict raised by replaying `item`.
    pub fn for_item(item: &PendingSyncItem, server_data: Value, detected_at: UnixMillis) -> Self {
        let mut record = Self::new(
            item.entity_type.clone(),
            item.entity_id.clone(),
            item.data.clone(),
            server_data,
        );
        record.item_id = Some(item.id.clone());
        record.detected_at = detected_at;
        record
    }

    /// Replaces the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Still awaiting resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Closes the conflict.
    pub fn mark_resolved(&mut self, kind: ResolutionKind, at: UnixMillis) {
        self.resolved = true;
        self.resolution = Some(kind);
        self.resolved_at = Some(at);
    }
}

fn field_conflict_value(c: &FieldConflict) -> Value {
    Value::object([
        ("field", Value::from(c.field.as_str())),
        ("local", c.local.clone()),
        ("server", c.server.clone()),
    ])
}

fn field_conflict_from_value(value: &Value) -> CoreResult<FieldConflict> {
    let f = Fields::new(CONFLICTS_STORE, value)?;
    Ok(FieldConflict {
        field: f.text("field")?,
        local: f.value("local")?.clone(),
        server: f.value("server")?.clone(),
    })
}

impl StoreRecord for ConflictRecord {
    const STORE: &'static str = CONFLICTS_STORE;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::from(self.id.as_str())),
            ("entity_type", Value::from(self.entity_type.as_str())),
            ("entity_id", Value::from(self.entity_id.as_str())),
            ("item_id", Value::from(self.item_id.clone())),
            ("local_data", self.local_data.clone()),
            ("server_data", self.server_data.clone()),
            (
                "field_conflicts",
                Value::Array(self.field_conflicts.iter().map(field_conflict_value).collect()),
            ),
            ("resolved", Value::from(self.resolved)),
            ("detected_at", int(self.detected_at)),
            ("resolved_at", opt_int(self.resolved_at)),
            (
                "resolution",
                Value::from(self.resolution.map(ResolutionKind::as_str)),
            ),
        ])
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let f = Fields::new(Self::STORE, value)?;
        let field_conflicts = match f.value("field_conflicts")? {
            Value::Array(items) => items
                .iter()
                .map(field_conflict_from_value)
                .collect::<CoreResult<_>>()?,
            other => {
                return Err(CoreError::invalid_record(
                    Self::STORE,
                    format!("field `field_conflicts` should be array, found {}", other.type_name()),
                ))
            }
        };
        Ok(Self {
            id: f.text("id")?,
            entity_type: f.text("entity_type")?,
            entity_id: f.text("entity_id")?,
            item_id: f.opt_text("item_id")?,
            local_data: f.value("local_data")?.clone(),
            server_data: f.value("server_data")?.clone(),
            field_conflicts,
            resolved: f.bool("resolved")?,
            detected_at: f.u64("detected_at")?,
            resolved_at: f.opt_u64("resolved_at")?,
            resolution: f.opt_text("resolution")?.map(|s| s.parse()).transpose()?,
        })
    }
}
