//! Parameter-Based Index
//!
//! Arbitrary key/value equality filters, interpreted by the backend.

use std::collections::BTreeMap;

use crate::constants::PARAM_INDEX_FIELDS_COUNT_MAX;
use crate::value::{DataKind, Value};

/// Index built from parameters.
///
/// An empty parameter set means "all records of the kind".
///
/// # Example
///
/// ```
/// use kawa_core::index::ParamIndex;
/// use kawa_core::value::DataKind;
///
/// let index = ParamIndex::new(DataKind::new("User"))
///     .with("age", 25)
///     .with("active", true);
/// assert_eq!(index.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParamIndex {
    kind: DataKind,
    params: BTreeMap<String, Value>,
}

impl ParamIndex {
    /// Create an index matching all records of a kind.
    #[must_use]
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Add an equality parameter.
    ///
    /// # Panics
    /// Panics if the parameter count limit is exceeded.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        assert!(
            self.params.len() < PARAM_INDEX_FIELDS_COUNT_MAX,
            "param index exceeds {PARAM_INDEX_FIELDS_COUNT_MAX} fields"
        );
        self.params.insert(field.into(), value.into());
        self
    }

    /// Data kind this index searches for.
    #[must_use]
    pub fn data_kind(&self) -> &DataKind {
        &self.kind
    }

    /// Search parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Whether the index matches all records of its kind.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.params.is_empty()
    }
}
