//! Vector-Similarity Index
//!
//! Free-text similarity search with a result limit and score threshold.

use crate::constants::{VECTOR_INDEX_LIMIT_DEFAULT, VECTOR_INDEX_THRESHOLD_DEFAULT};
use crate::value::DataKind;

/// Index for semantic/similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    kind: DataKind,
    query_text: String,
    limit: usize,
    threshold: f64,
}

impl VectorIndex {
    /// Create a similarity index with default limit and threshold.
    ///
    /// # Panics
    /// Panics if the query text is empty.
    #[must_use]
    pub fn new(kind: DataKind, query_text: impl Into<String>) -> Self {
        let query_text = query_text.into();
        assert!(!query_text.is_empty(), "query text cannot be empty");
        Self {
            kind,
            query_text,
            limit: VECTOR_INDEX_LIMIT_DEFAULT,
            threshold: VECTOR_INDEX_THRESHOLD_DEFAULT,
        }
    }

    /// Set the result limit.
    ///
    /// # Panics
    /// Panics if the limit is zero.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "limit must be positive");
        self.limit = limit;
        self
    }

    /// Set the similarity threshold.
    ///
    /// # Panics
    /// Panics if the threshold is outside [0.0, 1.0].
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "threshold {threshold} outside [0.0, 1.0]"
        );
        self.threshold = threshold;
        self
    }

    /// Data kind this index searches for.
    #[must_use]
    pub fn data_kind(&self) -> &DataKind {
        &self.kind
    }

    /// Query text.
    #[must_use]
    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// Maximum number of results.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Minimum similarity score in [0.0, 1.0].
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
