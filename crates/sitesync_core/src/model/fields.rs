//! Field access on stored maps.

use crate::error::{CoreError, CoreResult};
use sitesync_codec::Value;

/// Reads named fields out of a stored map, naming the store in errors.
pub(crate) struct Fields<'a> {
    store: &'static str,
    map: &'a Value,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(store: &'static str, value: &'a Value) -> CoreResult<Self> {
        if value.as_map().is_none() {
            return Err(CoreError::invalid_record(
                store,
                format!("expected map, found {}", value.type_name()),
            ));
        }
        Ok(Self { store, map: value })
    }

    fn wrong_type(&self, name: &str, expected: &str, found: &Value) -> CoreError {
        CoreError::invalid_record(
            self.store,
            format!(
                "field `{name}` should be {expected}, found {}",
                found.type_name()
            ),
        )
    }

    pub(crate) fn value(&self, name: &str) -> CoreResult<&'a Value> {
        self.map
            .get(name)
            .ok_or_else(|| CoreError::invalid_record(self.store, format!("missing field `{name}`")))
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub(crate) fn text(&self, name: &str) -> CoreResult<String> {
        let v = self.value(name)?;
        v.as_text()
            .map(str::to_owned)
            .ok_or_else(|| self.wrong_type(name, "text", v))
    }

    pub(crate) fn opt_text(&self, name: &str) -> CoreResult<Option<String>> {
        self.present(name)
            .map(|v| {
                v.as_text()
                    .map(str::to_owned)
                    .ok_or_else(|| self.wrong_type(name, "text", v))
            })
            .transpose()
    }

    pub(crate) fn u64(&self, name: &str) -> CoreResult<u64> {
        let v = self.value(name)?;
        self.to_u64(name, v)
    }

    pub(crate) fn opt_u64(&self, name: &str) -> CoreResult<Option<u64>> {
        self.present(name).map(|v| self.to_u64(name, v)).transpose()
    }

    pub(crate) fn u32(&self, name: &str) -> CoreResult<u32> {
        let n = self.u64(name)?;
        u32::try_from(n).map_err(|_| {
            CoreError::invalid_record(self.store, format!("field `{name}` out of range: {n}"))
        })
    }

    pub(crate) fn bool(&self, name: &str) -> CoreResult<bool> {
        let v = self.value(name)?;
        v.as_bool().ok_or_else(|| self.wrong_type(name, "bool", v))
    }

    pub(crate) fn bool_or(&self, name: &str, default: bool) -> CoreResult<bool> {
        match self.present(name) {
            Some(v) => v.as_bool().ok_or_else(|| self.wrong_type(name, "bool", v)),
            None => Ok(default),
        }
    }

    fn to_u64(&self, name: &str, v: &Value) -> CoreResult<u64> {
        v.as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| self.wrong_type(name, "a non-negative integer", v))
    }
}

/// Encodes an unsigned count or timestamp.
pub(crate) fn int(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Encodes an optional timestamp as null when absent.
pub(crate) fn opt_int(n: Option<u64>) -> Value {
    n.map_or(Value::Null, int)
}
