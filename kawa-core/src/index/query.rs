//! Native-Query Index
//!
//! An opaque backend query descriptor. `NativeQuery` names a storage-side
//! table and carries the conditions to apply; relational backends compile
//! it to SQL inside the executing transaction, and the in-memory backend
//! interprets it directly. The optimizer folds convertible filter
//! predicates into the descriptor to push work onto the backend.

use crate::predicate::Condition;
use crate::value::Value;

/// Backend-native query descriptor.
///
/// The `table` is the storage kind's native name; the data kind is
/// resolved from it through the registry when the query executes.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    /// Storage-side table (or namespace) the query targets
    pub table: String,
    /// Conjunction of conditions; empty selects everything
    pub conditions: Vec<Condition>,
}

impl NativeQuery {
    /// Query selecting every record in a table.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add several conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Evaluate the conditions against a storage record.
    ///
    /// Interpreting backends use this; compiling backends render SQL
    /// instead.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Index wrapping a native query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryIndex {
    name: String,
    query: NativeQuery,
}

impl QueryIndex {
    /// Create a query index.
    #[must_use]
    pub fn new(name: impl Into<String>, query: NativeQuery) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }

    /// Index name, for identification in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The native query descriptor.
    #[must_use]
    pub fn query(&self) -> &NativeQuery {
        &self.query
    }
}
