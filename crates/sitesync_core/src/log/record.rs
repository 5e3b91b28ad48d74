//! Log record types and framing.

use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use sitesync_codec::{CborReader, CborWriter};

/// Magic bytes opening every record.
pub const LOG_MAGIC: [u8; 4] = *b"SSLG";

/// Current record format version.
pub const LOG_VERSION: u16 = 1;

/// Type byte of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Insert or overwrite one record.
    Put = 1,
    /// Remove one record.
    Delete = 2,
    /// Empty a whole store.
    Clear = 3,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Clear),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One mutation in the log.
///
/// Store names and ids are written as CBOR text; a `Put` value follows as
/// the raw canonical CBOR bytes of the stored [`sitesync_codec::Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Insert or overwrite `id` in `store`.
    Put {
        /// Target store.
        store: String,
        /// Record id.
        id: String,
        /// Canonical CBOR bytes of the value.
        value: Vec<u8>,
    },
    /// Remove `id` from `store`.
    Delete {
        /// Target store.
        store: String,
        /// Record id.
        id: String,
    },
    /// Remove every record in `store`.
    Clear {
        /// Target store.
        store: String,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Clear { .. } => LogRecordType::Clear,
        }
    }

    /// True for records that only remove data.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Delete { .. } | Self::Clear { .. })
    }

    /// Name of the store this record touches.
    #[must_use]
    pub fn store(&self) -> &str {
        match self {
            Self::Put { store, .. } | Self::Delete { store, .. } | Self::Clear { store } => store,
        }
    }

    /// Serializes the payload (without envelope).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut writer = CborWriter::new();
        match self {
            Self::Put { store, id, value } => {
                writer.write_text(store);
                writer.write_text(id);
                let mut buf = writer.into_bytes();
                buf.extend_from_slice(value);
                return buf;
            }
            Self::Delete { store, id } => {
                writer.write_text(store);
                writer.write_text(id);
            }
            Self::Clear { store } => writer.write_text(store),
        }
        writer.into_bytes()
    }

    /// Deserializes a record found at `offset` from its type and payload.
    pub fn decode_payload(
        record_type: LogRecordType,
        payload: &[u8],
        offset: u64,
    ) -> CoreResult<Self> {
        let corrupt = |e: sitesync_codec::CodecError| CoreError::log_corruption(offset, e.to_string());
        let mut reader = CborReader::new(payload);
        let store = reader.read_text().map_err(corrupt)?;

        let record = match record_type {
            LogRecordType::Put => {
                let id = reader.read_text().map_err(corrupt)?;
                let value = reader.remaining().to_vec();
                if value.is_empty() {
                    return Err(CoreError::log_corruption(offset, "put record without value"));
                }
                return Ok(Self::Put { store, id, value });
            }
            LogRecordType::Delete => Self::Delete {
                id: reader.read_text().map_err(corrupt)?,
                store,
            },
            LogRecordType::Clear => Self::Clear { store },
        };

        if !reader.is_empty() {
            return Err(CoreError::log_corruption(
                offset,
                format!(
                    "{} trailing bytes in {:?} record",
                    reader.remaining().len(),
                    record_type
                ),
            ));
        }
        Ok(record)
    }

    /// Builds the full framed record ready to append.
    pub fn frame(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload();
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_argument("record payload exceeds 4 GiB"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// CRC32 (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
