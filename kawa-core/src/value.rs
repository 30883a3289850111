//! Value Model
//!
//! The neutral data representation flowing through pipelines. Backends
//! convert between their native rows/objects and `Value` via the
//! [`DataTypeRegistry`](crate::registry::DataTypeRegistry).
//!
//! All records are dynamically typed at the value level; `DataKind` names
//! the domain or storage type a value belongs to.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DATA_KIND_NAME_BYTES_MAX;

// =============================================================================
// DataKind
// =============================================================================

/// Name of a domain or backend-native data type.
///
/// Replaces runtime type objects: registries, indexes and create operations
/// are keyed by kind rather than by a concrete Rust type, so heterogeneous
/// backends can exchange records without generics at the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataKind(String);

impl DataKind {
    /// Create a new data kind.
    ///
    /// # Panics
    /// Panics if the name is empty or exceeds the length limit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        // Preconditions
        assert!(!name.is_empty(), "data kind name cannot be empty");
        assert!(
            name.len() <= DATA_KIND_NAME_BYTES_MAX,
            "data kind name {} bytes exceeds max {}",
            name.len(),
            DATA_KIND_NAME_BYTES_MAX
        );
        Self(name)
    }

    /// Name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed record value.
///
/// Records are `Map` values; collections are `List`. Numeric comparison
/// works across `Int` and `Float` so that pushed-down and in-process
/// filters agree on results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered collection
    List(Vec<Value>),
    /// Field map (a record)
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a record from field pairs.
    #[must_use]
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Get a field of a record, `None` for missing fields or non-records.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(field),
            _ => None,
        }
    }

    /// Set a field on a record. No-op on non-records.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        if let Self::Map(map) = self {
            map.insert(field.into(), value);
        }
    }

    /// Integer view, widening is not attempted.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: `Int` and `Float` both read as `f64`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => {
                // Precision loss above 2^53 is acceptable for comparisons.
                #[allow(clippy::cast_precision_loss)]
                Some(*i as f64)
            }
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text view.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Ordering-aware comparison.
    ///
    /// `Int` and `Float` compare numerically across variants; `Text`,
    /// `Bool` and `Bytes` compare within their own variant. Everything
    /// else is incomparable and returns `None`.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Check whether the value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert to a JSON value. `Bytes` become an array of numbers, since
    /// JSON has no byte-string type.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from a JSON value. Never produces `Bytes`: JSON arrays
    /// always map to `List`.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_kind_new() {
        let kind = DataKind::new("User");
        assert_eq!(kind.as_str(), "User");
        assert_eq!(kind.to_string(), "User");
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn test_data_kind_empty_name() {
        let _ = DataKind::new("");
    }

    #[test]
    fn test_record_field_access() {
        let mut user = Value::record([("name", Value::from("Alice")), ("age", Value::from(25))]);

        assert_eq!(user.get("name"), Some(&Value::Text("Alice".to_string())));
        assert_eq!(user.get("age"), Some(&Value::Int(25)));
        assert_eq!(user.get("missing"), None);

        user.set("age", Value::from(26));
        assert_eq!(user.get("age").and_then(Value::as_int), Some(26));
    }

    #[test]
    fn test_compare_cross_numeric() {
        assert_eq!(
            Value::Int(25).compare(&Value::Float(25.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(24.5).compare(&Value::Int(25)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Int(30).compare(&Value::Int(25)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_compare_incomparable() {
        assert_eq!(Value::Text("a".to_string()).compare(&Value::Int(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_value_serde_round_trip() {
        let user = Value::record([("name", Value::from("Bob")), ("age", Value::from(30))]);
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"age":30,"name":"Bob"}"#);
    }

    #[test]
    fn test_json_conversion_round_trip() {
        let record = Value::record([
            ("name", Value::from("Bob")),
            ("scores", Value::List(vec![Value::Int(1), Value::Int(2)])),
            ("active", Value::from(true)),
        ]);

        let json = record.to_json();
        let back = Value::from_json(json);

        assert_eq!(back, record);
    }
}
