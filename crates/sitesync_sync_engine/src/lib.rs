//! # sitesync sync engine
//!
//! Offline replay of buffered mutations and conflict resolution.
//!
//! This crate provides:
//! - [`SyncOrchestrator`]: session-wide state (connectivity, queue, conflicts)
//!   with subscriptions for the UI layer
//! - [`SyncExecutor`]: replays the queue against a [`RemoteApi`] with per-entity
//!   ordering, batching and bounded retry with exponential backoff
//! - [`resolve`] and [`Resolution`]: conflict resolution
//! - [`SyncWorker`]: a tokio task driving the executor
//! - [`InMemoryRemote`]: a reference server for tests and demos
//!
//! ## Data flow
//!
//! 1. The UI calls [`SyncOrchestrator::enqueue`]; the item is written to the
//!    durable store before the call returns
//! 2. When online, the executor replays due items in `(timestamp, id)` order
//! 3. A version mismatch becomes a [`sitesync_core::ConflictRecord`] and
//!    halts all replay until it is resolved
//! 4. [`SyncOrchestrator::resolve_conflict`] closes the conflict and arranges
//!    for the resolved state to be replayed
//!
//! ```rust
//! use std::sync::Arc;
//! use sitesync_codec::Value;
//! use sitesync_core::{DurableStore, SyncOperation};
//! use sitesync_sync_engine::{InMemoryRemote, SyncConfig, SyncExecutor, SyncOrchestrator};
//!
//! let store = Arc::new(DurableStore::open_in_memory().unwrap());
//! let orchestrator = SyncOrchestrator::new(store);
//! orchestrator
//!     .enqueue("tasks", "t-1", SyncOperation::Create, Value::object([("title", Value::from("Rough-in"))]))
//!     .unwrap();
//!
//! let executor = SyncExecutor::new(SyncConfig::default(), InMemoryRemote::new());
//! orchestrator.set_online(true);
//! let summary = executor.run(&orchestrator).unwrap();
//! assert_eq!(summary.success, 1);
//! assert_eq!(orchestrator.pending_syncs(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod executor;
mod orchestrator;
mod remote;
mod resolver;
mod state;
mod worker;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use executor::{HaltReason, SyncExecutor, SyncSummary};
pub use orchestrator::{Subscription, SyncOrchestrator, SyncPass};
pub use remote::{
    ApplyOutcome, ApplyRequest, FailureKind, InMemoryRemote, RemoteApi, RemoteFailure,
    ServerEntity,
};
pub use resolver::{merge_by_field, resolve, Resolution, ResolvedConflict, Side};
pub use state::{NetworkQuality, SyncProgress, SyncSnapshot, SyncStats};
pub use worker::SyncWorker;
