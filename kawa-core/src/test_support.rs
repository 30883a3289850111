//! Test helpers shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StorageError, StoreResult};
use crate::operation::Operation;
use crate::pipeline::Target;
use crate::storage::{PipelineData, Storage, StorageTransaction};

/// A named backend that refuses to execute anything. Composition and
/// validation tests only need target identity.
pub(crate) struct NullStorage {
    name: &'static str,
}

#[async_trait]
impl Storage for NullStorage {
    fn name(&self) -> &str {
        self.name
    }

    async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
        Err(StorageError::backend("null storage is not executable"))
    }

    async fn execute(
        &self,
        _operation: &Operation,
        _transaction: &mut dyn StorageTransaction,
        _previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        Err(StorageError::backend("null storage is not executable"))
    }

    async fn execute_sequence(
        &self,
        _operations: &[Operation],
        _transaction: &mut dyn StorageTransaction,
        _previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        Err(StorageError::backend("null storage is not executable"))
    }
}

/// A bind target over a [`NullStorage`].
pub(crate) fn null_target(name: &'static str) -> Target {
    Target::new(Arc::new(NullStorage { name }))
}
