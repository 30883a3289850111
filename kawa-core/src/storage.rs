//! Storage Contract
//!
//! The narrow interface the executor and optimizer consume. Backends
//! implement [`Storage`] and hand out [`StorageTransaction`] scopes; the
//! executor owns one transaction per group and consumes it on exit.
//!
//! # Resource rules
//!
//! - `commit`/`rollback` take the transaction by value (`Box<Self>`); a
//!   closed handle is structurally unavailable, there is no nulled-out
//!   sentinel to check at each use.
//! - Every result a backend returns must be fully materialized and owned.
//!   A lazy cursor must be drained inside the producing transaction's
//!   scope; [`PipelineData`] never borrows a transaction.

use std::any::Any;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::operation::Operation;
use crate::value::Value;

// =============================================================================
// PipelineData
// =============================================================================

/// One item stored in a path-addressed backend: the item plus the
/// backend-assigned address.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// The stored item
    pub item: Value,
    /// Backend-assigned address (e.g. object key)
    pub address: String,
}

/// Result handed from one operation to the next.
///
/// Backend-specific shapes (`Stored`, `Affected`) reduce to plain items
/// when a downstream operation is unaware of them.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineData {
    /// Ordered collection of records
    Rows(Vec<Value>),
    /// Single value (reduce/transform results)
    Scalar(Value),
    /// Items paired with backend-assigned addresses
    Stored(Vec<StoredItem>),
    /// Number of affected records
    Affected(u64),
}

impl PipelineData {
    /// Empty row set.
    #[must_use]
    pub fn empty() -> Self {
        Self::Rows(Vec::new())
    }

    /// Number of carried items.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Scalar(_) | Self::Affected(_) => 1,
            Self::Stored(items) => items.len(),
        }
    }

    /// Whether no items are carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Rows(rows) => rows.is_empty(),
            Self::Scalar(_) | Self::Affected(_) => false,
            Self::Stored(items) => items.is_empty(),
        }
    }

    /// Extract the items, dropping backend-specific shape.
    ///
    /// `Stored` keeps only the item half of each pair; `Affected` becomes
    /// a single count value.
    #[must_use]
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Rows(rows) => rows,
            Self::Scalar(value) => vec![value],
            Self::Stored(items) => items.into_iter().map(|stored| stored.item).collect(),
            Self::Affected(count) => vec![Value::Int(i64::try_from(count).unwrap_or(i64::MAX))],
        }
    }

    /// View the whole result as one value (for late-bound create literals).
    #[must_use]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Rows(rows) => Value::List(rows.clone()),
            Self::Scalar(value) => value.clone(),
            Self::Stored(items) => {
                Value::List(items.iter().map(|stored| stored.item.clone()).collect())
            }
            Self::Affected(count) => Value::Int(i64::try_from(*count).unwrap_or(i64::MAX)),
        }
    }
}

impl From<Vec<Value>> for PipelineData {
    fn from(rows: Vec<Value>) -> Self {
        Self::Rows(rows)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A transaction scope owned by exactly one executing group.
///
/// Committing or rolling back consumes the handle. Backends downcast via
/// [`as_any_mut`](Self::as_any_mut) to recover their concrete transaction
/// type and must fail with a foreign-transaction error on mismatch.
#[async_trait]
pub trait StorageTransaction: Send {
    /// Commit the transaction, consuming the handle.
    ///
    /// # Errors
    /// Backend commit failures, propagated unchanged.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Roll back the transaction, consuming the handle.
    ///
    /// # Errors
    /// Backend rollback failures, propagated unchanged.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;

    /// Downcast support for backends.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// =============================================================================
// Storage
// =============================================================================

/// A storage backend executing operations inside transactions.
///
/// All operations are async and return explicit errors. Backends accept
/// only the [`SearchIndex`](crate::index::SearchIndex) variants they
/// declare support for and return
/// [`StorageError::UnsupportedIndex`](crate::error::StorageError::UnsupportedIndex)
/// otherwise.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend name, used in errors, logs and target identity display.
    fn name(&self) -> &str;

    /// Open a new transaction scope.
    ///
    /// # Errors
    /// Backend connection/begin failures.
    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>>;

    /// Execute one operation inside the given transaction.
    ///
    /// `previous` carries the prior operation's result for operations that
    /// consume it (a create merging pipeline input, an in-process filter
    /// delegated to the backend's sequence executor).
    ///
    /// # Errors
    /// Contract violations or backend failures.
    async fn execute(
        &self,
        operation: &Operation,
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData>;

    /// Execute an operation sequence inside the given transaction,
    /// pushing down as much of it as the backend can.
    ///
    /// # Errors
    /// Contract violations or backend failures.
    async fn execute_sequence(
        &self,
        operations: &[Operation],
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData>;
}
