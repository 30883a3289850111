//! Object-Store Backend
//!
//! Path-addressed storage over the [`ObjectClient`] boundary. Values are
//! serialized to JSON; raw `Bytes` values pass through unserialized.
//! Create returns (item, address) pairs — the address is the generated
//! object key `[prefix/]<kind>/<uuid>.<ext>`.
//!
//! The store is non-transactional: operations take effect immediately and
//! the transaction scope is a no-op token. A group bound to an object
//! target therefore has no rollback; this matches the semantics of the
//! underlying stores (S3-like APIs have no multi-key transactions).

mod client;

pub use client::{MemoryObjectClient, ObjectClient, ObjectMeta};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::index::{PathIndex, SearchIndex};
use kawa_core::operation::Operation;
use kawa_core::registry::DataTypeRegistry;
use kawa_core::storage::{PipelineData, Storage, StorageTransaction, StoredItem};
use kawa_core::value::{DataKind, Value};

use crate::config::ObjectConfig;
use crate::inprocess;

// =============================================================================
// Transaction token
// =============================================================================

/// No-op scope for a non-transactional store.
struct ObjectTransaction;

#[async_trait]
impl StorageTransaction for ObjectTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        // Effects were immediate; there is nothing to undo.
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// =============================================================================
// ObjectStorage
// =============================================================================

/// Path-addressed object backend.
///
/// Supports `Path` indexes for read/update/delete and plain creates; all
/// other index variants are rejected with a typed error. No storage-side
/// optimization: sequences run operation by operation.
pub struct ObjectStorage {
    name: String,
    client: Arc<dyn ObjectClient>,
    registry: Arc<DataTypeRegistry>,
    config: ObjectConfig,
}

impl ObjectStorage {
    /// Create a backend over an object client.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ObjectClient>,
        registry: Arc<DataTypeRegistry>,
        config: ObjectConfig,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            registry,
            config,
        }
    }

    /// Generated address for a new object: `[prefix/]<kind>/<uuid>.<ext>`.
    fn generate_path(&self, kind: &DataKind, value: &Value) -> String {
        let extension = if matches!(value, Value::Bytes(_)) {
            "bin"
        } else {
            "json"
        };
        let leaf = format!("{}/{}.{}", kind, uuid::Uuid::new_v4().simple(), extension);
        match &self.config.prefix {
            Some(prefix) => format!("{}/{leaf}", prefix.trim_end_matches('/')),
            None => leaf,
        }
    }

    /// Serialize a value: raw passthrough for bytes, JSON otherwise.
    fn serialize(&self, value: &Value) -> StoreResult<(Vec<u8>, &str)> {
        match value {
            Value::Bytes(bytes) => Ok((bytes.clone(), &self.config.bytes_content_type)),
            other => {
                let bytes = serde_json::to_vec(&other.to_json())
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                Ok((bytes, &self.config.json_content_type))
            }
        }
    }

    /// Deserialize by content type: raw bytes stay bytes, JSON parses.
    fn deserialize(&self, bytes: Vec<u8>, content_type: Option<&str>) -> StoreResult<Value> {
        if content_type == Some(self.config.bytes_content_type.as_str()) {
            return Ok(Value::Bytes(bytes));
        }
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        Ok(Value::from_json(json))
    }

    fn to_storage_value(&self, kind: &DataKind, value: Value) -> StoreResult<Value> {
        match self.registry.get_for_user_kind(kind, None)? {
            Some(registration) => Ok(registration.to_storage(value)?),
            None => Ok(value),
        }
    }

    fn from_storage_value(&self, kind: &DataKind, value: Value) -> StoreResult<Value> {
        match self.registry.get_for_user_kind(kind, None)? {
            Some(registration) => Ok(registration.from_storage(value)?),
            None => Ok(value),
        }
    }

    fn path_index<'a>(&self, index: &'a SearchIndex) -> StoreResult<&'a PathIndex> {
        match index {
            SearchIndex::Path(path) => Ok(path),
            other => Err(StorageError::unsupported_index(
                self.name.clone(),
                other.variant(),
            )),
        }
    }

    async fn read_path(&self, path: &PathIndex) -> StoreResult<Value> {
        let meta = self.client.head(path.path()).await?;
        let bytes = self.client.get(path.path()).await?;
        let stored = self.deserialize(bytes, meta.as_ref().map(|m| m.content_type.as_str()))?;
        self.from_storage_value(path.data_kind(), stored)
    }
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        Ok(Box::new(ObjectTransaction))
    }

    async fn execute(
        &self,
        operation: &Operation,
        _transaction: &mut dyn StorageTransaction,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        match operation {
            Operation::Create(create) => {
                let items = inprocess::merge_create_input(create, previous);
                debug!(storage = %self.name, kind = %create.kind, count = items.len(), "create");

                let mut stored_items = Vec::with_capacity(items.len());
                for item in items {
                    let stored = self.to_storage_value(&create.kind, item.clone())?;
                    let path = self.generate_path(&create.kind, &stored);
                    let (bytes, content_type) = self.serialize(&stored)?;
                    self.client.put(&path, bytes, content_type).await?;
                    stored_items.push(StoredItem {
                        item,
                        address: path,
                    });
                }
                Ok(PipelineData::Stored(stored_items))
            }

            Operation::Read(read) => {
                let path = self.path_index(&read.index)?;
                let value = self.read_path(path).await?;
                Ok(PipelineData::Rows(vec![value]))
            }

            Operation::Update(update) => {
                let path = self.path_index(&update.index)?;
                let current = self.read_path(path).await?;
                let patched = update.patch.apply(&current);

                let stored = self.to_storage_value(path.data_kind(), patched.clone())?;
                let (bytes, content_type) = self.serialize(&stored)?;
                self.client.put(path.path(), bytes, content_type).await?;
                Ok(PipelineData::Rows(vec![patched]))
            }

            Operation::Delete(delete) => {
                let path = self.path_index(&delete.index)?;
                let existed = self.client.delete(path.path()).await?;
                Ok(PipelineData::Affected(u64::from(existed)))
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
        // No storage-side optimization here: one operation at a time.
        let mut result = previous.cloned();
        for operation in operations {
            let step = match operation {
                Operation::Create(create) => {
                    let resolved = inprocess::resolve_create(create, result.as_ref());
                    self.execute(&resolved, transaction, None).await?
                }
                op if op.needs_previous_result() => inprocess::apply(op, result.as_ref())?,
                op => self.execute(op, transaction, result.as_ref()).await?,
            };
            result = Some(step);
        }
        Ok(result.unwrap_or_else(PipelineData::empty))
    }
}

// =============================================================================
// Tests
// =============================================================================
