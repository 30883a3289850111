//! Postgres Backend
//!
//! Production relational backend over sqlx. One JSONB-backed table per
//! storage kind:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "<table>" (
//!     id   TEXT  PRIMARY KEY,
//!     data JSONB NOT NULL
//! );
//! ```
//!
//! `NativeQuery` descriptors compile to SQL with typed casts on the JSONB
//! fields (`(data->>'age')::numeric >= $1`); compilation happens inside
//! the executing transaction. Rows are fully fetched before a result
//! leaves the transaction scope.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::index::{NativeQuery, SearchIndex};
use kawa_core::operation::Operation;
use kawa_core::patch::Patch;
use kawa_core::predicate::{CmpOp, Condition};
use kawa_core::registry::DataTypeRegistry;
use kawa_core::storage::{PipelineData, Storage, StorageTransaction};
use kawa_core::value::{DataKind, Value};

use crate::config::PostgresConfig;
use crate::inprocess;
use crate::optimizer::{ExecutionPlan, SqlPipelineOptimizer};

// =============================================================================
// Transaction
// =============================================================================

struct PgStorageTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl StorageTransaction for PgStorageTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::transaction(format!("commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::transaction(format!("rollback failed: {e}")))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// =============================================================================
// Query compilation
// =============================================================================

/// One rendered condition: SQL fragment plus its bind value.
struct CompiledCondition {
    fragment: String,
    bind: Option<Value>,
}

/// Render a condition against the JSONB `data` column. The placeholder
/// index is 1-based and already assigned by the caller.
fn compile_condition(condition: &Condition, placeholder: usize) -> CompiledCondition {
    let field = condition.field.replace('\'', "''");
    match &condition.value {
        Value::Null => {
            // Null comparisons collapse to existence checks.
            let fragment = match condition.op {
                CmpOp::Ne => format!("data->>'{field}' IS NOT NULL"),
                _ => format!("data->>'{field}' IS NULL"),
            };
            CompiledCondition {
                fragment,
                bind: None,
            }
        }
        Value::Int(_) | Value::Float(_) => CompiledCondition {
            fragment: format!(
                "(data->>'{field}')::numeric {} ${placeholder}",
                condition.op.symbol()
            ),
            bind: Some(condition.value.clone()),
        },
        Value::Bool(_) => CompiledCondition {
            fragment: format!(
                "(data->>'{field}')::boolean {} ${placeholder}",
                condition.op.symbol()
            ),
            bind: Some(condition.value.clone()),
        },
        _ => CompiledCondition {
            fragment: format!("data->>'{field}' {} ${placeholder}", condition.op.symbol()),
            bind: Some(condition.value.clone()),
        },
    }
}

/// Render the WHERE clause of a native query, returning the SQL tail and
/// bind values in placeholder order.
fn compile_where(query: &NativeQuery, first_placeholder: usize) -> (String, Vec<Value>) {
    if query.conditions.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut fragments = Vec::with_capacity(query.conditions.len());
    let mut binds = Vec::new();
    let mut placeholder = first_placeholder;
    for condition in &query.conditions {
        let compiled = compile_condition(condition, placeholder);
        if let Some(bind) = compiled.bind {
            binds.push(bind);
            placeholder += 1;
        }
        fragments.push(compiled.fragment);
    }
    (format!(" WHERE {}", fragments.join(" AND ")), binds)
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Bool(b) => query.bind(*b),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        other => query.bind(other.to_json()),
    }
}

/// Table names come from registered kinds; restrict them to identifier
/// characters before they are quoted into SQL.
fn checked_table(table: &str) -> StoreResult<&str> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(table)
    } else {
        Err(StorageError::query(format!(
            "invalid table name {table:?}"
        )))
    }
}

// =============================================================================
// PostgresStorage
// =============================================================================

/// PostgreSQL storage backend.
///
/// Supports `Params` and `Query` indexes; `Path` and `Vector` indexes are
/// rejected with a typed error.
pub struct PostgresStorage {
    name: String,
    pool: PgPool,
    registry: Arc<DataTypeRegistry>,
    optimizer: SqlPipelineOptimizer,
}

impl PostgresStorage {
    /// Connect a backend.
    ///
    /// # Errors
    /// Connection failures.
    pub async fn connect(
        name: impl Into<String>,
        config: PostgresConfig,
        registry: Arc<DataTypeRegistry>,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;
        Ok(Self::from_pool(name, pool, registry))
    }

    /// Create a backend over an existing pool.
    #[must_use]
    pub fn from_pool(name: impl Into<String>, pool: PgPool, registry: Arc<DataTypeRegistry>) -> Self {
        Self {
            name: name.into(),
            pool,
            registry: Arc::clone(&registry),
            optimizer: SqlPipelineOptimizer::new(registry),
        }
    }

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

    /// The native query an index denotes, for this backend.
    fn query_for_index(&self, index: &SearchIndex) -> StoreResult<NativeQuery> {
        match index {
            SearchIndex::Params(params) => {
                let table = self.table_for_user_kind(params.data_kind())?;
                let conditions = params
                    .params()
                    .iter()
                    .map(|(field, value)| Condition::new(field.clone(), CmpOp::Eq, value.clone()));
                Ok(NativeQuery::table(table).with_conditions(conditions))
            }
            SearchIndex::Query(query) => Ok(query.query().clone()),
            SearchIndex::Path(_) | SearchIndex::Vector(_) => Err(
                StorageError::unsupported_index(self.name.clone(), index.variant()),
            ),
        }
    }

    fn pg<'a>(
        &self,
        transaction: &'a mut dyn StorageTransaction,
    ) -> StoreResult<&'a mut PgStorageTransaction> {
        transaction
            .as_any_mut()
            .downcast_mut::<PgStorageTransaction>()
            .ok_or_else(|| StorageError::ForeignTransaction {
                storage: self.name.clone(),
            })
    }

    async fn ensure_table(
        &self,
        txn: &mut PgStorageTransaction,
        table: &str,
    ) -> StoreResult<()> {
        let table = checked_table(table)?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (id TEXT PRIMARY KEY, data JSONB NOT NULL)"
        );
        sqlx::query(&sql)
            .execute(&mut *txn.tx)
            .await
            .map_err(|e| StorageError::query(format!("failed to create table: {e}")))?;
        Ok(())
    }

    async fn fetch_rows(
        &self,
        txn: &mut PgStorageTransaction,
        query: &NativeQuery,
    ) -> StoreResult<Vec<Value>> {
        let table = checked_table(&query.table)?;
        self.ensure_table(txn, table).await?;

        let (where_sql, binds) = compile_where(query, 1);
        let sql = format!("SELECT data FROM \"{table}\"{where_sql} ORDER BY id");
        debug!(storage = %self.name, %sql, "read");

        let mut prepared = sqlx::query(&sql);
        for value in &binds {
            prepared = bind_value(prepared, value);
        }

        // fetch_all materializes the cursor inside the transaction scope.
        let rows = prepared
            .fetch_all(&mut *txn.tx)
            .await
            .map_err(|e| StorageError::query(format!("read failed: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let json: serde_json::Value = row
                    .try_get("data")
                    .map_err(|e| StorageError::query(format!("row decode failed: {e}")))?;
                self.from_storage_value(&query.table, Value::from_json(json))
            })
            .collect()
    }
}

impl std::fmt::Debug for PostgresStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStorage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::transaction(format!("begin failed: {e}")))?;
        Ok(Box::new(PgStorageTransaction { tx }))
    }

    async fn execute(
        &self,
        operation: &Operation,
        transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        match operation {
            Operation::Create(create) => {
                let items = inprocess::merge_create_input(create, previous);
                let table = self.table_for_user_kind(&create.kind)?;
                let txn = self.pg(transaction)?;
                self.ensure_table(txn, &table).await?;
                let table_name = checked_table(&table)?.to_string();

                let mut created = Vec::with_capacity(items.len());
                for item in items {
                    let stored = self.to_storage_value(&create.kind, item)?;
                    let id = match stored.get("id") {
                        Some(Value::Text(id)) => id.clone(),
                        Some(Value::Int(id)) => id.to_string(),
                        _ => uuid::Uuid::new_v4().to_string(),
                    };
                    let sql = format!(
                        "INSERT INTO \"{table_name}\" (id, data) VALUES ($1, $2) \
                         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data"
                    );
                    sqlx::query(&sql)
                        .bind(&id)
                        .bind(stored.to_json())
                        .execute(&mut *txn.tx)
                        .await
                        .map_err(|e| StorageError::query(format!("insert failed: {e}")))?;
                    created.push(self.from_storage_value(&table, stored)?);
                }
                Ok(PipelineData::Rows(created))
            }

            Operation::Read(read) => {
                let query = self.query_for_index(&read.index)?;
                let txn = self.pg(transaction)?;
                let rows = self.fetch_rows(txn, &query).await?;
                Ok(PipelineData::Rows(rows))
            }

            Operation::Update(update) => {
                let query = self.query_for_index(&update.index)?;
                let table = checked_table(&query.table)?.to_string();
                let txn = self.pg(transaction)?;

                match &update.patch {
                    Patch::Fields(fields) => {
                        // Field diffs fold into one native UPDATE.
                        self.ensure_table(txn, &table).await?;
                        let diff = Value::Map(fields.clone()).to_json();
                        let (where_sql, binds) = compile_where(&query, 2);
                        let sql = format!(
                            "UPDATE \"{table}\" SET data = data || $1{where_sql} RETURNING data"
                        );
                        debug!(storage = %self.name, %sql, "update");

                        let mut prepared = sqlx::query(&sql).bind(diff);
                        for value in &binds {
                            prepared = bind_value(prepared, value);
                        }
                        let rows = prepared
                            .fetch_all(&mut *txn.tx)
                            .await
                            .map_err(|e| StorageError::query(format!("update failed: {e}")))?;

                        rows.into_iter()
                            .map(|row| {
                                let json: serde_json::Value = row.try_get("data").map_err(|e| {
                                    StorageError::query(format!("row decode failed: {e}"))
                                })?;
                                self.from_storage_value(&query.table, Value::from_json(json))
                            })
                            .collect::<StoreResult<Vec<_>>>()
                            .map(PipelineData::Rows)
                    }
                    Patch::Transform(_) => {
                        // Transform patches run per record in-process, then
                        // write back row by row.
                        let current = self.fetch_rows(txn, &query).await?;
                        let mut updated = Vec::with_capacity(current.len());
                        for record in current {
                            let patched = update.patch.apply(&record);
                            let id = match patched.get("id") {
                                Some(Value::Text(id)) => id.clone(),
                                Some(Value::Int(id)) => id.to_string(),
                                _ => {
                                    return Err(StorageError::query(
                                        "transform patch requires records with an id field",
                                    ))
                                }
                            };
                            let sql = format!("UPDATE \"{table}\" SET data = $2 WHERE id = $1");
                            sqlx::query(&sql)
                                .bind(&id)
                                .bind(patched.to_json())
                                .execute(&mut *txn.tx)
                                .await
                                .map_err(|e| {
                                    StorageError::query(format!("update failed: {e}"))
                                })?;
                            updated.push(patched);
                        }
                        Ok(PipelineData::Rows(updated))
                    }
                }
            }

            Operation::Delete(delete) => {
                let query = self.query_for_index(&delete.index)?;
                let table = checked_table(&query.table)?.to_string();
                let txn = self.pg(transaction)?;
                self.ensure_table(txn, &table).await?;

                let (where_sql, binds) = compile_where(&query, 1);
                let sql = format!("DELETE FROM \"{table}\"{where_sql}");
                debug!(storage = %self.name, %sql, "delete");

                let mut prepared = sqlx::query(&sql);
                for value in &binds {
                    prepared = bind_value(prepared, value);
                }
                let result = prepared
                    .execute(&mut *txn.tx)
                    .await
                    .map_err(|e| StorageError::query(format!("delete failed: {e}")))?;
                Ok(PipelineData::Affected(result.rows_affected()))
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
                let mut result = if optimized.needs_previous_result() {
                    inprocess::apply(&optimized, previous)?
                } else {
                    self.execute(&optimized, transaction, previous).await?
                };
                for operation in &analysis.remaining {
                    result = if operation.needs_previous_result() {
                        inprocess::apply(operation, Some(&result))?
                    } else {
                        self.execute(operation, transaction, Some(&result)).await?
                    };
                }
                Ok(result)
            }
            ExecutionPlan::InProcess => {
                let mut result = previous.cloned();
                for operation in operations {
                    let step = if operation.needs_previous_result() {
                        inprocess::apply(operation, result.as_ref())?
                    } else {
                        self.execute(operation, transaction, result.as_ref()).await?
                    };
                    result = Some(step);
                }
                Ok(result.unwrap_or_else(PipelineData::empty))
            }
        }
    }
}

// =============================================================================
// Tests (query compilation; execution is covered by the memory backend,
// which shares the same optimizer and contract)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_where_numeric_cast() {
        let query = NativeQuery::table("users")
            .with_condition(Condition::new("age", CmpOp::Ge, 30))
            .with_condition(Condition::new("name", CmpOp::Eq, "Bob"));

        let (sql, binds) = compile_where(&query, 1);
        assert_eq!(
            sql,
            " WHERE (data->>'age')::numeric >= $1 AND data->>'name' = $2"
        );
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_compile_where_null_checks() {
        let query = NativeQuery::table("users")
            .with_condition(Condition::new("email", CmpOp::Eq, Value::Null))
            .with_condition(Condition::new("phone", CmpOp::Ne, Value::Null));

        let (sql, binds) = compile_where(&query, 1);
        assert_eq!(
            sql,
            " WHERE data->>'email' IS NULL AND data->>'phone' IS NOT NULL"
        );
        assert!(binds.is_empty());
    }

    #[test]
    fn test_compile_where_empty() {
        let query = NativeQuery::table("users");
        let (sql, binds) = compile_where(&query, 1);
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }

    #[test]
    fn test_checked_table_rejects_injection() {
        assert!(checked_table("users").is_ok());
        assert!(checked_table("user_rows_2").is_ok());
        assert!(checked_table("users\"; DROP TABLE users; --").is_err());
        assert!(checked_table("").is_err());
    }
}
