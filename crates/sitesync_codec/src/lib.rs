//! # SiteSync Codec
//!
//! Canonical CBOR encoding for queued payloads and durable records.
//!
//! Every payload that passes through the sync queue is stored as a
//! [`Value`]. Encoding is deterministic:
//! - map keys are sorted by their encoded form (length first, then bytewise)
//! - integers use the shortest encoding
//! - floats are always 64-bit and never NaN
//! - strings must be UTF-8
//! - no indefinite-length items and no tags
//!
//! JSON conversion lives in [`from_json`] / [`to_json`].
//!
//! ## Usage
//!
//! ```
//! use sitesync_codec::{from_cbor, to_cbor, Value};
//!
//! let payload = Value::object([("status", Value::from("approved"))]);
//! let bytes = to_cbor(&payload).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), payload);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod json;
mod value;

pub use decoder::{from_cbor, CborReader, MAX_DEPTH};
pub use encoder::{to_cbor, CborWriter};
pub use error::{CodecError, CodecResult};
pub use json::{from_json, to_json};
pub use value::Value;

/// Types with a canonical CBOR form.
pub trait Encode {
    /// Encode to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be rebuilt from their canonical CBOR form.
pub trait Decode: Sized {
    /// Decode from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("NaN has no encoding", |f| !f.is_nan())
                .prop_map(Value::Float),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z0-9 ]{0,12}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|fields| Value::object(fields)),
            ]
        })
    }

    #[test]
    fn nested_payload_survives_encoding() {
        let payload = Value::object([
            ("title", Value::from("Inspect rebar")),
            ("progress", Value::from(0.75)),
            (
                "assignees",
                Value::Array(vec![Value::from(4), Value::from(17)]),
            ),
            ("photo", Value::Bytes(vec![0xde, 0xad])),
            ("closed_at", Value::Null),
        ]);

        let bytes = payload.encode().unwrap();
        assert_eq!(Value::decode(&bytes).unwrap(), payload);
    }

    proptest! {
        #[test]
        fn encoding_is_canonical(value in arb_value()) {
            let bytes = to_cbor(&value).unwrap();
            let decoded = from_cbor(&bytes).unwrap();
            prop_assert_eq!(&decoded, &value);
            prop_assert_eq!(to_cbor(&decoded).unwrap(), bytes);
        }
    }
}
