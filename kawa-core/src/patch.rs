//! Update Patches
//!
//! An update payload is either a field diff or a transform function,
//! normalized into one tagged union at the API boundary. Only the field
//! form can be folded into a native UPDATE; the transform form applies
//! in-process to each matched record.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Record transform function applied to each matched record.
pub type PatchFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Update payload.
#[derive(Clone)]
pub enum Patch {
    /// Field diff merged into each matched record
    Fields(BTreeMap<String, Value>),
    /// Transform function replacing each matched record
    Transform(PatchFn),
}

impl Patch {
    /// Field-diff patch.
    #[must_use]
    pub fn fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Fields(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Single-field patch.
    #[must_use]
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Fields(BTreeMap::from([(name.into(), value.into())]))
    }

    /// Transform patch.
    #[must_use]
    pub fn transform(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self::Transform(Arc::new(f))
    }

    /// Whether the patch can be folded into a native UPDATE.
    #[must_use]
    pub fn is_convertible(&self) -> bool {
        matches!(self, Self::Fields(_))
    }

    /// Apply the patch to one record.
    #[must_use]
    pub fn apply(&self, record: &Value) -> Value {
        match self {
            Self::Fields(fields) => {
                let mut updated = record.clone();
                for (field, value) in fields {
                    updated.set(field.clone(), value.clone());
                }
                updated
            }
            Self::Transform(f) => f(record),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::Transform(_) => write!(f, "Transform(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_patch_merges() {
        let record = Value::record([("name", Value::from("Alice")), ("age", Value::from(25))]);
        let patch = Patch::field("age", 26);

        let updated = patch.apply(&record);

        assert_eq!(updated.get("age"), Some(&Value::Int(26)));
        assert_eq!(updated.get("name"), Some(&Value::Text("Alice".to_string())));
    }

    #[test]
    fn test_transform_patch_replaces() {
        let record = Value::record([("age", Value::from(25))]);
        let patch = Patch::transform(|r| {
            let age = r.get("age").and_then(Value::as_int).unwrap_or(0);
            Value::record([("age", Value::from(age + 1))])
        });

        let updated = patch.apply(&record);
        assert_eq!(updated.get("age"), Some(&Value::Int(26)));
    }

    #[test]
    fn test_convertibility() {
        assert!(Patch::field("age", 1).is_convertible());
        assert!(!Patch::transform(|r| r.clone()).is_convertible());
    }
}
