//! # sitesync core
//!
//! The local durable queue store and the records it holds.
//!
//! This crate provides:
//! - [`DurableStore`]: a crash-safe key-value store partitioned into named
//!   stores, backed by an append-only record log with replay, torn-tail
//!   recovery and compaction
//! - [`PendingSyncItem`]: a buffered mutation awaiting replay
//! - [`ConflictRecord`]: a divergence between local and server state
//! - [`StoreRecord`]: typed access to records in their store
//!
//! ```rust
//! use sitesync_codec::Value;
//! use sitesync_core::{DurableStore, PendingSyncItem, SyncOperation};
//!
//! let store = DurableStore::open_in_memory().unwrap();
//! let item = PendingSyncItem::new(
//!     "projects",
//!     "p-1",
//!     SyncOperation::Update,
//!     Value::object([("name", Value::from("Tower B"))]),
//! );
//! store.put_record(&item).unwrap();
//!
//! let queued: Vec<PendingSyncItem> = store.all_records().unwrap();
//! assert_eq!(queued, vec![item]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lock;
pub mod log;
mod model;
mod stats;
mod store;
mod types;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use lock::{lock_path, StoreLock};
pub use model::{
    diff_fields, ConflictRecord, EntityKey, FieldConflict, PendingSyncItem, ResolutionKind,
    StoreRecord, SyncOperation, SyncStatus,
};
pub use stats::{OperationCounts, StoreStats, VerifyReport};
pub use store::DurableStore;
pub use types::{now_millis, StorageQuota, UnixMillis, CONFLICTS_STORE, SYNC_QUEUE_STORE};
