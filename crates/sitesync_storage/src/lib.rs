//! # sitesync storage
//!
//! Byte-store backends underneath the sitesync durable queue.
//!
//! A backend only knows how to append bytes, read them back, and make them
//! durable. The record framing, partitioning into named stores and replay
//! after a restart all live in `sitesync_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral; clones share one buffer so a test can
//!   "reload" a store without touching the file system
//! - [`FileBackend`] - persistent storage using OS file APIs
//! - [`QuotaBackend`] - wrapper that refuses writes beyond a byte budget
//!
//! ## Example
//!
//! ```rust
//! use sitesync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"queued").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"queued");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod quota;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use quota::QuotaBackend;
