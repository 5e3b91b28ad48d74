//! Records kept in the durable store.
//!
//! Each record type is stored as a codec map with named fields in its own
//! store, addressed by its `id`. [`StoreRecord`] ties a type to its store so
//! callers can use the typed accessors on [`crate::DurableStore`].

mod conflict;
mod fields;
mod item;

pub use conflict::{diff_fields, ConflictRecord, FieldConflict, ResolutionKind};
pub use item::{EntityKey, PendingSyncItem, SyncOperation, SyncStatus};

use crate::error::CoreResult;
use sitesync_codec::Value;

/// A type persisted as one record in a named store.
///
/// # Example
///
/// ```rust
/// use sitesync_codec::Value;
/// use sitesync_core::{CoreResult, DurableStore, StoreRecord};
///
/// struct Draft {
///     id: String,
/// }
///
/// impl StoreRecord for Draft {
///     const STORE: &'static str = "drafts";
///
///     fn record_id(&self) -> &str {
///         &self.id
///     }
///
///     fn to_value(&self) -> Value {
///         Value::object([("id", Value::from(self.id.as_str()))])
///     }
///
///     fn from_value(value: &Value) -> CoreResult<Self> {
///         let id = value.get("id").and_then(Value::as_text).unwrap_or_default();
///         Ok(Draft { id: id.to_owned() })
///     }
/// }
///
/// let store = DurableStore::open_in_memory().unwrap();
/// store.put_record(&Draft { id: "d1".into() }).unwrap();
/// assert!(store.get_record::<Draft>("d1").unwrap().is_some());
/// ```
pub trait StoreRecord: Sized {
    /// Store the records live in.
    const STORE: &'static str;

    /// Key of this record within its store.
    fn record_id(&self) -> &str;

    /// Encodes the record as a codec value.
    fn to_value(&self) -> Value;

    /// Rebuilds the record from a stored value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidRecord`] when the value lacks a
    /// field or holds one of the wrong type.
    fn from_value(value: &Value) -> CoreResult<Self>;
}
