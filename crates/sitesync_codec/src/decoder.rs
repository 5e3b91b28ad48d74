//! Canonical CBOR decoder.

use std::cmp::Ordering;

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Largest element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Largest byte or text string accepted.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Deepest nesting of arrays and maps accepted.
pub const MAX_DEPTH: usize = 128;

/// Decode exactly one value from `bytes`.
///
/// # Errors
///
/// Fails on malformed or non-canonical input, on NaN, on tags and when
/// bytes remain after the value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = CborReader::new(bytes);
    let value = reader.read()?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.remaining().len(),
        });
    }
    Ok(value)
}

/// Reads a sequence of canonical CBOR values from a byte slice.
pub struct CborReader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CborReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Read the next value.
    pub fn read(&mut self) -> CodecResult<Value> {
        let initial = self.byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            3 => {
                let len = self.length(info, MAX_BYTES_LENGTH)?;
                let raw = self.take(len)?;
                let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_owned()))
            }
            4 => {
                let len = self.length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|r| {
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(r.read()?);
                    }
                    Ok(Value::Array(items))
                })
            }
            5 => {
                let len = self.length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|r| r.read_map(len))
            }
            6 => Err(CodecError::unsupported_type("tag")),
            _ => self.read_simple(info),
        }
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Unconsumed input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Read a value that must be a text string.
    pub fn read_text(&mut self) -> CodecResult<String> {
        match self.read()? {
            Value::Text(s) => Ok(s),
            other => Err(CodecError::invalid_structure(format!(
                "expected text, found {}",
                other.type_name()
            ))),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<T>) -> CodecResult<T> {
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

    fn byte(&mut self) -> CodecResult<u8> {
        let b = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.byte()?), 24),
            25 => (u64::from(u16::from_be_bytes(self.take_array()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.take_array()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.take_array()?), 0x1_0000_0000),
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < floor {
            return Err(CodecError::invalid_structure(
                "non-canonical: argument not in shortest form",
            ));
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn length(&mut self, info: u8, max: u64) -> CodecResult<usize> {
        let len = self.argument(info)?;
        if len > max {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: max,
            });
        }
        Ok(len as usize)
    }

    fn read_map(&mut self, len: usize) -> CodecResult<Value> {
        let mut pairs = Vec::with_capacity(len.min(1024));
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let start = self.pos;
            let key = self.read()?;
            let key_bytes = &self.data[start..self.pos];

            if let Some(prev) = prev_key {
                let order = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if order != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not strictly ascending",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.read()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    fn read_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 | 26 => Err(CodecError::NonCanonicalFloat),
            27 => {
                let f = f64::from_bits(u64::from_be_bytes(self.take_array()?));
                if f.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(f))
            }
            31 => Err(CodecError::invalid_structure("break outside indefinite item")),
            _ => Err(CodecError::unsupported_type(format!("simple value {info}"))),
        }
    }
}
