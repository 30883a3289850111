//! Integration Tests for Atomicity and Fault Paths
//!
//! A group is the atomicity unit: a failing operation rolls back its
//! whole group and nothing else. Earlier, already-committed groups stay
//! committed (no cross-group rollback).

use std::sync::Arc;

use kawa_core::error::StorageError;
use kawa_core::index::{ParamIndex, PathIndex};
use kawa_core::operation::Operation;
use kawa_core::pipeline::Target;
use kawa_core::predicate::Predicate;
use kawa_core::registry::DataTypeRegistry;
use kawa_core::value::{DataKind, Value};
use kawa_store::executor::PipelineExecutor;
use kawa_store::memory::{FaultPlan, MemoryStorage};

fn registry() -> Arc<DataTypeRegistry> {
    let mut registry = DataTypeRegistry::new();
    registry.register_identity(DataKind::new("users"), DataKind::new("User"));
    Arc::new(registry)
}

fn user(age: i64) -> Value {
    Value::record([("age", Value::from(age))])
}

fn user_kind() -> DataKind {
    DataKind::new("User")
}

#[tokio::test]
async fn test_failing_group_rolls_back_entirely() {
    // The second write fails; the first create was in the same group and
    // must not survive.
    let storage = Arc::new(
        MemoryStorage::new("sql", registry()).with_faults(FaultPlan::fail_after_writes(1)),
    );
    let sql = Target::new(storage.clone());

    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(Operation::create(user_kind(), [user(30)]).bound_to(&sql));

    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert!(matches!(err, StorageError::Injected { .. }));
    assert!(storage.committed_rows("users").is_empty());
}

#[tokio::test]
async fn test_no_cross_group_rollback() {
    // An in-process filter splits the creates into two groups. The first
    // group commits before the second starts; when the second fails, the
    // first group's rows remain.
    let storage = Arc::new(
        MemoryStorage::new("sql", registry()).with_faults(FaultPlan::fail_after_writes(1)),
    );
    let sql = Target::new(storage.clone());

    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(Operation::filter(Predicate::ge("age", 0)))
        .then(Operation::create(user_kind(), [user(30)]).bound_to(&sql));

    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert!(matches!(err, StorageError::Injected { .. }));

    let committed = storage.committed_rows("users");
    assert_eq!(committed.len(), 1, "first group stays committed");
    assert_eq!(committed[0].get("age"), Some(&Value::Int(25)));
}

#[tokio::test]
async fn test_commit_fault_discards_the_group() {
    let storage =
        Arc::new(MemoryStorage::new("sql", registry()).with_faults(FaultPlan::fail_commit()));
    let sql = Target::new(storage.clone());

    // Create and read share the transaction; the read observes staged
    // rows, yet the commit fault discards everything.
    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(Operation::read(ParamIndex::new(user_kind())).bound_to(&sql));

    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert!(matches!(err, StorageError::Injected { .. }));
    assert!(storage.committed_rows("users").is_empty());
}

#[tokio::test]
async fn test_unsupported_index_is_a_typed_error() {
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage);

    // A path index belongs to object stores; the relational backend must
    // reject it with a typed error, not misread it.
    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(
            Operation::read(PathIndex::new(user_kind(), "users/someone.json")).bound_to(&sql),
        );

    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::UnsupportedIndex { ref index, .. } if index == "path"
    ));
}

#[tokio::test]
async fn test_backend_error_propagates_unchanged() {
    // The injected fault surfaces to the caller as-is; the executor does
    // not translate or swallow backend errors.
    let storage = Arc::new(
        MemoryStorage::new("sql", registry()).with_faults(FaultPlan::fail_after_writes(0)),
    );
    let sql = Target::new(storage);

    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(Operation::filter(Predicate::ge("age", 0)));

    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert_eq!(err.to_string(), "injected fault: write fault after 0 writes");
}
