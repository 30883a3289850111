//! In-Memory Backend
//!
//! Deterministic relational-family backend. Tests are written against
//! this backend first; `PostgresStorage` must satisfy the same contract.
//!
//! # Transactions
//!
//! Snapshot semantics: `begin` clones the committed tables, operations
//! mutate the staged copy, `commit` swaps it in, `rollback` drops it.
//! Concurrent pipelines each work on their own snapshot.
//!
//! # Fault injection
//!
//! A [`FaultPlan`] makes the backend fail deterministically — after the
//! Nth write, or at commit — so abort paths are testable without a real
//! server.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::index::SearchIndex;
use kawa_core::operation::Operation;
use kawa_core::predicate::{CmpOp, Condition};
use kawa_core::registry::DataTypeRegistry;
use kawa_core::storage::{PipelineData, Storage, StorageTransaction};
use kawa_core::value::{DataKind, Value};

use crate::inprocess;
use crate::optimizer::{ExecutionPlan, SqlPipelineOptimizer};

/// Tables keyed by storage kind name; rows keyed by id.
type Tables = HashMap<String, BTreeMap<String, Value>>;

// =============================================================================
// Faults
// =============================================================================

/// Deterministic failure plan for abort-path testing.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail every write operation after this many have succeeded
    pub fail_after_writes: Option<u64>,
    /// Fail at commit instead of applying the staged tables
    pub fail_commit: bool,
}

impl FaultPlan {
    /// Plan failing the first write after `count` successful ones.
    #[must_use]
    pub fn fail_after_writes(count: u64) -> Self {
        Self {
            fail_after_writes: Some(count),
            fail_commit: false,
        }
    }

    /// Plan failing every commit.
    #[must_use]
    pub fn fail_commit() -> Self {
        Self {
            fail_after_writes: None,
            fail_commit: true,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

struct MemoryTransaction {
    staged: Tables,
    shared: Arc<RwLock<Tables>>,
    fail_commit: bool,
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.fail_commit {
            return Err(StorageError::injected("commit fault"));
        }
        *self.shared.write().expect("table lock poisoned") = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        // Staged tables are simply dropped.
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-memory relational-family backend.
///
/// Supports `Params`, `Query` and `Vector` indexes; `Path` indexes belong
/// to object stores and are rejected with a typed error.
pub struct MemoryStorage {
    name: String,
    registry: Arc<DataTypeRegistry>,
    tables: Arc<RwLock<Tables>>,
    optimizer: SqlPipelineOptimizer,
    faults: FaultPlan,
    writes: AtomicU64,
}

impl MemoryStorage {
    /// Create an empty backend.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: Arc<DataTypeRegistry>) -> Self {
        Self {
            name: name.into(),
            registry: Arc::clone(&registry),
            tables: Arc::new(RwLock::new(HashMap::new())),
            optimizer: SqlPipelineOptimizer::new(registry),
            faults: FaultPlan::default(),
            writes: AtomicU64::new(0),
        }
    }

    /// Add a deterministic failure plan.
    #[must_use]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Snapshot the committed rows of one table, in id order.
    ///
    /// For tests and inspection; pipeline reads go through transactions.
    #[must_use]
    pub fn committed_rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .expect("table lock poisoned")
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn count_write(&self) -> StoreResult<()> {
        let done = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(allowed) = self.faults.fail_after_writes {
            if done >= allowed {
                return Err(StorageError::injected(format!(
                    "write fault after {allowed} writes"
                )));
            }
        }
        Ok(())
    }

    /// Table name for a user kind: the registered storage kind, or the
    /// kind name itself when nothing is registered.
    fn table_for_user_kind(&self, kind: &DataKind) -> StoreResult<String> {
        Ok(self
            .registry
            .get_for_user_kind(kind, None)?
            .map_or_else(|| kind.as_str().to_string(), |r| r.storage_kind.to_string()))
    }

    fn to_storage_value(&self, kind: &DataKind, value: Value) -> StoreResult<Value> {
        match self.registry.get_for_user_kind(kind, None)? {
            Some(registration) => Ok(registration.to_storage(value)?),
            None => Ok(value),
        }
    }

    fn from_storage_value(&self, table: &str, value: Value) -> StoreResult<Value> {
        match self
            .registry
            .get_for_storage_kind(&DataKind::new(table), None)?
        {
            Some(registration) => Ok(registration.from_storage(value)?),
            None => Ok(value),
        }
    }

    fn row_id(value: &Value) -> String {
        match value.get("id") {
            Some(Value::Text(id)) => id.clone(),
            Some(Value::Int(id)) => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Matching row ids for an index, in id order.
    fn locate(&self, staged: &Tables, index: &SearchIndex) -> StoreResult<(String, Vec<String>)> {
        match index {
            SearchIndex::Params(params) => {
                let table = self.table_for_user_kind(params.data_kind())?;
                let conditions: Vec<Condition> = params
                    .params()
                    .iter()
                    .map(|(field, value)| Condition::new(field.clone(), CmpOp::Eq, value.clone()))
                    .collect();
                let ids = Self::matching_ids(staged, &table, |row| {
                    conditions.iter().all(|c| c.matches(row))
                });
                Ok((table, ids))
            }
            SearchIndex::Query(query) => {
                let table = query.query().table.clone();
                let ids = Self::matching_ids(staged, &table, |row| query.query().matches(row));
                Ok((table, ids))
            }
            SearchIndex::Vector(_) | SearchIndex::Path(_) => Err(
                StorageError::unsupported_index(self.name.clone(), index.variant()),
            ),
        }
    }

    fn matching_ids(staged: &Tables, table: &str, matches: impl Fn(&Value) -> bool) -> Vec<String> {
        staged
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| matches(row))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Token-overlap similarity search: the score is the share of query
    /// tokens present in the record's text fields.
    fn vector_search(
        &self,
        staged: &Tables,
        index: &kawa_core::index::VectorIndex,
    ) -> StoreResult<Vec<Value>> {
        let table = self.table_for_user_kind(index.data_kind())?;
        let query_tokens = Self::tokenize(index.query_text());
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, String, Value)> = staged
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, row)| {
                        let row_tokens = Self::record_tokens(row);
                        let overlap = query_tokens.intersection(&row_tokens).count();
                        #[allow(clippy::cast_precision_loss)]
                        let score = overlap as f64 / query_tokens.len() as f64;
                        (score, id.clone(), row.clone())
                    })
                    .filter(|(score, _, _)| *score >= index.threshold())
                    .collect()
            })
            .unwrap_or_default();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        scored.truncate(index.limit());

        scored
            .into_iter()
            .map(|(_, _, row)| self.from_storage_value(&table, row))
            .collect()
    }

    fn tokenize(text: &str) -> BTreeSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn record_tokens(row: &Value) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        if let Value::Map(fields) = row {
            for value in fields.values() {
                if let Value::Text(text) = value {
                    tokens.extend(Self::tokenize(text));
                }
            }
        }
        tokens
    }

    fn staged<'a>(&self, transaction: &'a mut dyn StorageTransaction) -> StoreResult<&'a mut MemoryTransaction> {
        transaction
            .as_any_mut()
            .downcast_mut::<MemoryTransaction>()
            .ok_or_else(|| StorageError::ForeignTransaction {
                storage: self.name.clone(),
            })
    }

    async fn run_one(
        &self,
        operation: &Operation,
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        if operation.needs_previous_result() {
            return inprocess::apply(operation, previous);
        }
        if let Operation::Create(create) = operation {
            let resolved = inprocess::resolve_create(create, previous);
            return self.execute(&resolved, transaction, None).await;
        }
        self.execute(operation, transaction, previous).await
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        let staged = self.tables.read().expect("table lock poisoned").clone();
        Ok(Box::new(MemoryTransaction {
            staged,
            shared: Arc::clone(&self.tables),
            fail_commit: self.faults.fail_commit,
        }))
    }

    async fn execute(
        &self,
        operation: &Operation,
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        match operation {
            Operation::Create(create) => {
                self.count_write()?;
                let items = inprocess::merge_create_input(create, previous);
                debug!(storage = %self.name, kind = %create.kind, count = items.len(), "create");

                let table = self.table_for_user_kind(&create.kind)?;
                let mut created = Vec::with_capacity(items.len());
                for item in items {
                    let stored = self.to_storage_value(&create.kind, item)?;
                    let id = Self::row_id(&stored);
                    let echoed = self.from_storage_value(&table, stored.clone())?;
                    self.staged(transaction)?
                        .staged
                        .entry(table.clone())
                        .or_default()
                        .insert(id, stored);
                    created.push(echoed);
                }
                Ok(PipelineData::Rows(created))
            }

            Operation::Read(read) => {
                if let SearchIndex::Vector(vector) = &read.index {
                    let txn = self.staged(transaction)?;
                    let rows = self.vector_search(&txn.staged, vector)?;
                    return Ok(PipelineData::Rows(rows));
                }

                let txn = self.staged(transaction)?;
                let (table, ids) = self.locate(&txn.staged, &read.index)?;
                let rows = ids
                    .into_iter()
                    .filter_map(|id| txn.staged.get(&table).and_then(|t| t.get(&id)).cloned())
                    .map(|row| self.from_storage_value(&table, row))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(PipelineData::Rows(rows))
            }

            Operation::Update(update) => {
                self.count_write()?;
                let txn = self.staged(transaction)?;
                let (table, ids) = self.locate(&txn.staged, &update.index)?;

                let mut updated = Vec::with_capacity(ids.len());
                for id in ids {
                    let Some(stored) = txn.staged.get(&table).and_then(|t| t.get(&id)).cloned()
                    else {
                        continue;
                    };
                    let user = self.from_storage_value(&table, stored)?;
                    let patched = update.patch.apply(&user);
                    let kind = self
                        .registry
                        .get_for_storage_kind(&DataKind::new(table.as_str()), None)?
                        .map_or_else(
                            || DataKind::new(table.as_str()),
                            |r| r.user_kind.clone(),
                        );
                    let restored = self.to_storage_value(&kind, patched.clone())?;
                    if let Some(rows) = txn.staged.get_mut(&table) {
                        rows.insert(id, restored);
                    }
                    updated.push(patched);
                }
                Ok(PipelineData::Rows(updated))
            }

            Operation::Delete(delete) => {
                self.count_write()?;
                let txn = self.staged(transaction)?;
                let (table, ids) = self.locate(&txn.staged, &delete.index)?;
                let mut removed = 0u64;
                if let Some(rows) = txn.staged.get_mut(&table) {
                    for id in ids {
                        if rows.remove(&id).is_some() {
                            removed += 1;
                        }
                    }
                }
                Ok(PipelineData::Affected(removed))
            }

            Operation::Filter(_)
            | Operation::Map(_)
            | Operation::Reduce(_)
            | Operation::Transform(_) => inprocess::apply(operation, previous),
        }
    }

    async fn execute_sequence(
        &self,
        operations: &[Operation],
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        let analysis = self.optimizer.analyze(operations)?;

        match analysis.execution_plan {
            ExecutionPlan::Storage | ExecutionPlan::Hybrid => {
                let optimized = analysis.optimized.ok_or_else(|| {
                    StorageError::query("analysis produced a plan without an operation")
                })?;
                let mut result = self.run_one(&optimized, transaction, previous).await?;
                for operation in &analysis.remaining {
                    result = self.run_one(operation, transaction, Some(&result)).await?;
                }
                Ok(result)
            }
            ExecutionPlan::InProcess => {
                let mut result = previous.cloned();
                for operation in operations {
                    result = Some(self.run_one(operation, transaction, result.as_ref()).await?);
                }
                Ok(result.unwrap_or_else(PipelineData::empty))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
