//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding, decoding or JSON conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// NaN cannot be stored: it has no canonical encoding and never equals itself.
    #[error("NaN values are forbidden")]
    NaNForbidden,

    /// Half- and single-precision floats are not produced by the encoder.
    #[error("non-canonical float width: only 64-bit floats are accepted")]
    NonCanonicalFloat,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the top-level value.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Unsupported CBOR type.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// Integer outside the signed 64-bit range.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A declared length is larger than the decoder accepts.
    #[error("size limit exceeded: claimed {claimed}, max {max_allowed}")]
    SizeLimitExceeded {
        /// Size announced by the input.
        claimed: u64,
        /// Largest accepted size.
        max_allowed: u64,
    },

    /// Nesting deeper than the decoder accepts.
    #[error("nesting deeper than {max_depth} levels")]
    TooDeep {
        /// Maximum accepted depth.
        max_depth: usize,
    },

    /// A value has no JSON representation (byte strings, non-text map keys,
    /// non-finite floats).
    #[error("value cannot be represented as JSON: {message}")]
    NotJson {
        /// What could not be converted.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create a JSON conversion error.
    pub fn not_json(message: impl Into<String>) -> Self {
        Self::NotJson {
            message: message.into(),
        }
    }
}
