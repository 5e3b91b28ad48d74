//! Append-only record log underneath the durable store.
//!
//! ## Record Format
//!
//! ```text
//! | magic "SSLG" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The CRC covers every byte before it.
//!
//! ## Recovery Policy
//!
//! A crash can leave one incomplete record at the end of the log. Replay
//! treats a short header or a payload running past the end as a clean end of
//! log; the store then truncates those bytes.
//!
//! A complete record with a bad checksum, bad magic, an unknown type or a
//! newer format version is corruption. The store refuses to open rather than
//! silently drop records that follow it.

mod reader;
mod record;

pub use reader::{LogEntry, LogReader};
pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing checksum.
pub(crate) const CRC_SIZE: usize = 4;
