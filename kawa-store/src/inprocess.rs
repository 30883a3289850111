//! In-Process Operation Evaluation
//!
//! Filter/Map/Reduce/Transform always execute here, against the previous
//! operation's materialized result. Create executes here only when it is
//! unbound: it then just merges its input and passes the items along.
//!
//! Backends reuse these functions for the in-process suffix of a hybrid
//! plan, so a filter produces the same rows whether it ran pushed-down or
//! not.

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::operation::{CreateOperation, Literal, Operation};
use kawa_core::storage::PipelineData;
use kawa_core::value::Value;

/// Merge a create's explicit data with the previous result.
///
/// Previous-result items come first, explicit items after. Late-bound
/// literals are invoked with the whole previous result (or `Null` when
/// there is none). Both sides empty is a legitimate no-op. `Stored`
/// (item, address) pairs from an earlier create are reduced to their item
/// halves before merging.
#[must_use]
pub fn merge_create_input(create: &CreateOperation, previous: Option<&PipelineData>) -> Vec<Value> {
    let previous_value = previous.map_or(Value::Null, PipelineData::as_value);

    let mut merged: Vec<Value> = previous
        .map(|data| data.clone().into_items())
        .unwrap_or_default();

    for literal in &create.data {
        match literal {
            Literal::Value(value) => merged.push(value.clone()),
            Literal::FromResult(f) => merged.push(f(&previous_value)),
        }
    }

    merged
}

/// Resolve a create for execution: merge its input and return an
/// operation whose payload is plain values only.
#[must_use]
pub fn resolve_create(create: &CreateOperation, previous: Option<&PipelineData>) -> Operation {
    Operation::create(
        create.kind.clone(),
        merge_create_input(create, previous),
    )
}

/// Execute one operation in-process.
///
/// # Errors
/// [`StorageError::MissingPreviousResult`] when a consuming operation has
/// no input; [`StorageError::UnboundOperation`] for CRUD kinds other than
/// create, which cannot run without a backend.
pub fn apply(operation: &Operation, previous: Option<&PipelineData>) -> StoreResult<PipelineData> {
    match operation {
        Operation::Filter(op) => {
            let items = require_items(operation, previous)?;
            Ok(PipelineData::Rows(
                items
                    .into_iter()
                    .filter(|item| op.predicate.matches(item))
                    .collect(),
            ))
        }
        Operation::Map(op) => {
            let items = require_items(operation, previous)?;
            Ok(PipelineData::Rows(
                items
                    .iter()
                    .enumerate()
                    .map(|(position, item)| (op.mapper)(item, position))
                    .collect(),
            ))
        }
        Operation::Reduce(op) => {
            let items = require_items(operation, previous)?;
            let mut accumulator = op.initial.clone();
            for item in &items {
                accumulator = (op.reducer)(accumulator, item);
            }
            Ok(PipelineData::Scalar(accumulator))
        }
        Operation::Transform(op) => {
            let items = require_items(operation, previous)?;
            Ok(PipelineData::Scalar((op.transform)(items)))
        }
        Operation::Create(op) => {
            // Unbound create: merge and pass the items along unchanged.
            Ok(PipelineData::Rows(merge_create_input(op, previous)))
        }
        Operation::Read(_) | Operation::Update(_) | Operation::Delete(_) => {
            Err(StorageError::unbound(operation.name()))
        }
    }
}

fn require_items(
    operation: &Operation,
    previous: Option<&PipelineData>,
) -> StoreResult<Vec<Value>> {
    previous
        .map(|data| data.clone().into_items())
        .ok_or_else(|| StorageError::missing_previous(operation.name()))
}

// =============================================================================
// Tests
// =============================================================================
