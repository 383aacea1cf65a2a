//! History record type and the reserved-key rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User key holding the training step; the dedup key of a merge.
pub const STEP_KEY: &str = "step";

/// Reserved key holding the wall-clock time (seconds) the record was logged.
pub const TIMESTAMP_KEY: &str = "_timestamp";

/// Prefix marking backend-internal keys (`_timestamp`, `_runtime`, `_step`, ...).
pub const RESERVED_PREFIX: char = '_';

/// Returns true for backend-internal keys.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// One logged history row: metric name to value, plus `step` and `_timestamp`.
///
/// Serialized transparently as a JSON object so it round-trips unchanged through
/// the backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Record { fields: Map::new() }
    }

    /// Wrap an existing JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Record { fields }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    /// The integer step of this record, if it has a usable one.
    ///
    /// Integral floats (`12.0`) count as integers since some backends store every
    /// number as a double. Strings, nulls and fractional values do not.
    pub fn step(&self) -> Option<i64> {
        let n = match self.fields.get(STEP_KEY)? {
            Value::Number(n) => n,
            _ => return None,
        };
        n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        })
    }

    /// The `_timestamp` field as seconds, if present and numeric.
    pub fn timestamp(&self) -> Option<f64> {
        self.fields.get(TIMESTAMP_KEY).and_then(Value::as_f64)
    }

    /// Copy of this record fit for re-logging: every reserved key is dropped
    /// except `_timestamp`.
    pub fn for_replay(&self) -> Record {
        let fields = self
            .fields
            .iter()
            .filter(|(k, _)| !is_reserved_key(k) || k.as_str() == TIMESTAMP_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Record { fields }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record::from_map(fields)
    }
}
