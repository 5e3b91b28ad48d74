//! Canonical CBOR encoder.

use crate::decoder::MAX_DEPTH;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// Map keys are written in canonical order (length first, then bytewise)
/// regardless of the order they are held in, integers use their shortest
/// form and floats are always written as 64-bit.
///
/// # Errors
///
/// Returns [`CodecError::NaNForbidden`] if the value contains a NaN float
/// and [`CodecError::TooDeep`] if arrays and maps nest deeper than the
/// decoder accepts.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut writer = CborWriter::new();
    writer.write(value)?;
    Ok(writer.into_bytes())
}

/// Incremental canonical CBOR writer.
///
/// Several values may be written back to back; the durable log uses this to
/// frame a record's fields without an intermediate allocation per field.
#[derive(Debug, Default)]
pub struct CborWriter {
    buf: Vec<u8>,
    depth: usize,
}

impl CborWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            depth: 0,
        }
    }

    /// Append one value.
    pub fn write(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buf.push(0xf6),
            Value::Bool(false) => self.buf.push(0xf4),
            Value::Bool(true) => self.buf.push(0xf5),
            Value::Integer(n) => self.write_integer(*n),
            Value::Float(f) => self.write_float(*f)?,
            Value::Bytes(b) => {
                self.write_head(2, b.len() as u64);
                self.buf.extend_from_slice(b);
            }
            Value::Text(s) => self.write_text(s),
            Value::Array(items) => self.nested(|w| {
                w.write_head(4, items.len() as u64);
                for item in items {
                    w.write(item)?;
                }
                Ok(())
            })?,
            Value::Map(pairs) => self.nested(|w| w.write_map(pairs))?,
        }
        Ok(())
    }

    /// Append a text string without building a [`Value`].
    pub fn write_text(&mut self, text: &str) {
        self.write_head(3, text.len() as u64);
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Consume the writer and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<()>) -> CodecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep {
                max_depth: MAX_DEPTH,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(0, n as u64);
        } else {
            // -1 - n is in [0, i64::MAX] for every negative n
            self.write_head(1, (-1 - n) as u64);
        }
    }

    fn write_float(&mut self, f: f64) -> CodecResult<()> {
        if f.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buf.push(0xfb);
        self.buf.extend_from_slice(&f.to_bits().to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        match arg {
            0..=23 => self.buf.push(mt | arg as u8),
            24..=0xff => {
                self.buf.push(mt | 24);
                self.buf.push(arg as u8);
            }
            0x100..=0xffff => {
                self.buf.push(mt | 25);
                self.buf.extend_from_slice(&(arg as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buf.push(mt | 26);
                self.buf.extend_from_slice(&(arg as u32).to_be_bytes());
            }
            _ => {
                self.buf.push(mt | 27);
                self.buf.extend_from_slice(&arg.to_be_bytes());
            }
        }
    }

    fn write_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut keyed = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            // Keys count toward depth the same way the decoder sees them.
            let mut key_writer = CborWriter {
                buf: Vec::new(),
                depth: self.depth,
            };
            key_writer.write(key)?;
            keyed.push((key_writer.buf, value));
        }
        keyed.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        if keyed.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::invalid_structure("duplicate map key"));
        }

        self.write_head(5, keyed.len() as u64);
        for (key_bytes, value) in keyed {
            self.buf.extend_from_slice(&key_bytes);
            self.write(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: &Value) -> Vec<u8> {
        to_cbor(value).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(&Value::Null), vec![0xf6]);
        assert_eq!(enc(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(enc(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_head() {
        assert_eq!(enc(&Value::Integer(0)), vec![0x00]);
        assert_eq!(enc(&Value::Integer(23)), vec![0x17]);
        assert_eq!(enc(&Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(enc(&Value::Integer(256)), vec![0x19, 0x01, 0x00]);
        assert_eq!(
            enc(&Value::Integer(65536)),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(enc(&Value::Integer(i64::MAX))[0], 0x1b);
    }

    #[test]
    fn negative_integers() {
        assert_eq!(enc(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(enc(&Value::Integer(-24)), vec![0x37]);
        assert_eq!(enc(&Value::Integer(-25)), vec![0x38, 24]);
        assert_eq!(
            enc(&Value::Integer(i64::MIN)),
            vec![0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn floats_are_always_double() {
        assert_eq!(
            enc(&Value::Float(1.5)),
            vec![0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(enc(&Value::Float(f64::INFINITY))[0], 0xfb);
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(
            to_cbor(&Value::Float(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
        let nested = Value::object([("reading", Value::Float(f64::NAN))]);
        assert_eq!(to_cbor(&nested), Err(CodecError::NaNForbidden));
    }

    #[test]
    fn strings_and_bytes() {
        assert_eq!(enc(&Value::Bytes(vec![1, 2, 3])), vec![0x43, 1, 2, 3]);
        assert_eq!(enc(&Value::Text("a".into())), vec![0x61, b'a']);
        assert_eq!(enc(&Value::Text(String::new())), vec![0x60]);
    }

    #[test]
    fn map_keys_written_in_canonical_order() {
        let unsorted = Value::Map(vec![
            (Value::Text("bb".into()), Value::Integer(2)),
            (Value::Text("a".into()), Value::Integer(1)),
            (Value::Integer(1), Value::Null),
        ]);

        assert_eq!(
            enc(&unsorted),
            vec![0xa3, 0x01, 0xf6, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let dup = Value::Map(vec![
            (Value::Text("a".into()), Value::Integer(1)),
            (Value::Text("a".into()), Value::Integer(2)),
        ]);
        assert!(matches!(
            to_cbor(&dup),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    fn nest(levels: usize) -> Value {
        (0..levels).fold(Value::Null, |inner, _| Value::Array(vec![inner]))
    }

    #[test]
    fn nesting_limit_matches_the_decoder() {
        let deepest = nest(MAX_DEPTH);
        let bytes = enc(&deepest);
        assert_eq!(crate::from_cbor(&bytes).unwrap(), deepest);

        assert_eq!(
            to_cbor(&nest(MAX_DEPTH + 1)),
            Err(CodecError::TooDeep {
                max_depth: MAX_DEPTH
            })
        );
        let in_map = Value::object([("sheets", nest(MAX_DEPTH))]);
        assert!(matches!(to_cbor(&in_map), Err(CodecError::TooDeep { .. })));
    }

    #[test]
    fn writer_concatenates_values() {
        let mut writer = CborWriter::with_capacity(8);
        writer.write_text("id");
        writer.write(&Value::Integer(7)).unwrap();
        assert_eq!(writer.as_bytes(), &[0x62, b'i', b'd', 0x07]);
    }
}
