//! # sitesync testkit
//!
//! Test utilities for the sitesync workspace.
//!
//! This crate provides:
//! - Throwaway durable stores that can be reopened or torn mid-write
//! - A storage backend that fails writes on demand
//! - Property-based test generators using proptest
//! - An end-to-end harness pairing a session with an in-memory server
//! - Stress runs that enqueue while passes drain the queue
//!
//! ## Usage
//!
//! ```rust
//! use sitesync_testkit::prelude::*;
//! use sitesync_codec::Value;
//! use sitesync_core::SyncOperation;
//!
//! let harness = SyncHarness::new();
//! harness
//!     .orchestrator
//!     .enqueue("projects", "p-1", SyncOperation::Create, Value::empty_object())
//!     .unwrap();
//! assert_eq!(harness.run_at(0).unwrap().success, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use stress::*;
