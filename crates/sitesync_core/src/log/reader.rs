//! Sequential replay of the record log.

use super::record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use sitesync_storage::StorageBackend;

/// A decoded record and where it sits in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Offset of the record's first byte.
    pub offset: u64,
    /// Framed length in bytes.
    pub len: u64,
    /// The record.
    pub record: LogRecord,
}

/// Reads records one by one from a backend.
///
/// Iteration stops cleanly at the end of the log or at a torn tail; after
/// that [`LogReader::valid_end`] is the offset just past the last complete
/// record and [`LogReader::torn_bytes`] counts what follows it.
pub struct LogReader<'a, B: StorageBackend + ?Sized> {
    backend: &'a B,
    size: u64,
    offset: u64,
    finished: bool,
}

impl<'a, B: StorageBackend + ?Sized> LogReader<'a, B> {
    /// Starts reading at the beginning of the log.
    pub fn new(backend: &'a B) -> CoreResult<Self> {
        Ok(Self {
            size: backend.size()?,
            backend,
            offset: 0,
            finished: false,
        })
    }

    /// Offset just past the last complete record read so far.
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Bytes after [`Self::valid_end`] that do not form a complete record.
    pub fn torn_bytes(&self) -> u64 {
        self.size - self.offset
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_next(&mut self) -> CoreResult<Option<LogEntry>> {
        let start = self.offset;
        let available = self.size - start;
        if available < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(start, "invalid magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::log_corruption(
                start,
                format!("unsupported format version {version}"),
            ));
        }
        let record_type = LogRecordType::from_byte(header[6]).ok_or_else(|| {
            CoreError::log_corruption(start, format!("unknown record type {}", header[6]))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);

        let total = (HEADER_SIZE + CRC_SIZE) as u64 + u64::from(payload_len);
        if total > available {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len as usize);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut framed = header;
        framed.extend_from_slice(payload);
        let computed = compute_crc32(&framed);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                offset: start,
                expected: stored,
                actual: computed,
            });
        }

        let record = LogRecord::decode_payload(record_type, payload, start)?;
        self.offset = start + total;
        Ok(Some(LogEntry {
            offset: start,
            len: total,
            record,
        }))
    }
}

impl<B: StorageBackend + ?Sized> Iterator for LogReader<'_, B> {
    type Item = CoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
