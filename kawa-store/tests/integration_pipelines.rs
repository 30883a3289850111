//! Integration Tests for Pipeline Execution
//!
//! End-to-end workflow validation across backends:
//! - single-backend pipelines with pushdown and transaction grouping
//! - in-process operations consuming backend results
//! - multi-backend hand-off into a path-addressed object store

use std::sync::{Arc, Once};

use kawa_core::index::ParamIndex;
use kawa_core::operation::Operation;
use kawa_core::pipeline::Target;
use kawa_core::predicate::Predicate;
use kawa_core::registry::DataTypeRegistry;
use kawa_core::storage::PipelineData;
use kawa_core::validator::validate;
use kawa_core::value::{DataKind, Value};
use kawa_store::config::ObjectConfig;
use kawa_store::executor::PipelineExecutor;
use kawa_store::memory::MemoryStorage;
use kawa_store::object::{MemoryObjectClient, ObjectClient, ObjectStorage};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

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

fn sum_ages() -> Operation {
    Operation::reduce(
        |acc, item| {
            let acc = acc.as_int().unwrap_or(0);
            let age = item.get("age").and_then(Value::as_int).unwrap_or(0);
            Value::Int(acc + age)
        },
        0,
    )
}

// =============================================================================
// Single-backend scenarios
// =============================================================================

#[tokio::test]
async fn test_create_filter_reduce() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage.clone());

    // Create two records, keep the older one, sum the ages.
    let pipeline = Operation::create(user_kind(), [user(25), user(30)])
        .bound_to(&sql)
        .then(Operation::filter(Predicate::ge("age", 30)))
        .then(sum_ages());

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();

    assert_eq!(result, PipelineData::Scalar(Value::Int(30)));
    // The create's group committed.
    assert_eq!(storage.committed_rows("users").len(), 2);
}

#[tokio::test]
async fn test_same_target_group_reads_its_own_writes() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage.clone());

    // Create and read share one transaction: the read sees the staged
    // rows before anything is committed.
    let pipeline = Operation::create(user_kind(), [user(25), user(30)])
        .bound_to(&sql)
        .then(Operation::read(ParamIndex::new(user_kind())).bound_to(&sql))
        .then(sum_ages());

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();
    assert_eq!(result, PipelineData::Scalar(Value::Int(55)));
}

#[tokio::test]
async fn test_bound_sub_pipeline_uses_pushdown() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage.clone());

    let seed = Operation::create(user_kind(), [user(17), user(25), user(30)]).bound_to(&sql);
    PipelineExecutor::new()
        .execute(&seed.then(Operation::filter(Predicate::ge("age", 0))))
        .await
        .unwrap();

    // read + convertible filters fold into one native query on the backend.
    let sub = Operation::read(ParamIndex::new(user_kind()))
        .then(Operation::filter(Predicate::ge("age", 18)))
        .then(Operation::filter(Predicate::lt("age", 30)));
    let pipeline = sub
        .bound_to(&sql)
        .then(Operation::map(|item, _| {
            item.get("age").cloned().unwrap_or(Value::Null)
        }));

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();
    assert_eq!(result.into_items(), vec![Value::Int(25)]);
}

#[tokio::test]
async fn test_empty_create_merge_is_a_no_op() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage.clone());

    // An empty create fed by an empty read stores nothing and fails nothing.
    let pipeline = Operation::read(ParamIndex::new(user_kind()))
        .bound_to(&sql)
        .then(Operation::create_from_previous(user_kind()).bound_to(&sql));

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();
    assert!(result.is_empty());
    assert!(storage.committed_rows("users").is_empty());
}

#[tokio::test]
async fn test_validation_runs_before_any_execution() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new("sql", registry()));
    let sql = Target::new(storage.clone());

    // Unbound read at index 1: rejected up front, the create never runs.
    let pipeline = Operation::create(user_kind(), [user(25)])
        .bound_to(&sql)
        .then(Operation::read(ParamIndex::new(user_kind())));

    assert!(validate(&pipeline).is_err());
    let err = PipelineExecutor::new().execute(&pipeline).await.unwrap_err();
    assert!(matches!(
        err,
        kawa_core::error::StorageError::Validation(_)
    ));
    assert!(storage.committed_rows("users").is_empty());
}

// =============================================================================
// Multi-backend scenarios
// =============================================================================

fn object_backend(registry: &Arc<DataTypeRegistry>) -> (Arc<ObjectStorage>, Arc<MemoryObjectClient>) {
    let client = Arc::new(MemoryObjectClient::new());
    let storage = Arc::new(ObjectStorage::new(
        "objects",
        client.clone(),
        Arc::clone(registry),
        ObjectConfig::default(),
    ));
    (storage, client)
}

#[tokio::test]
async fn test_aggregate_moves_into_object_store_as_byte_blob() {
    init_tracing();
    let registry = registry();
    let sql_storage = Arc::new(MemoryStorage::new("sql", Arc::clone(&registry)));
    let sql = Target::new(sql_storage.clone());
    let (object_storage, client) = object_backend(&registry);
    let objects = Target::new(object_storage);

    // Seed ages 25 and 30.
    PipelineExecutor::new()
        .execute(
            &Operation::create(user_kind(), [user(25), user(30)])
                .bound_to(&sql)
                .then(Operation::filter(Predicate::ge("age", 0))),
        )
        .await
        .unwrap();

    // read(all) -> reduce(+age, 0) -> transform(to_bytes) -> create() @ objects
    let pipeline = Operation::read(ParamIndex::new(user_kind()))
        .bound_to(&sql)
        .then(sum_ages())
        .then(Operation::transform(|items| {
            let total = items
                .first()
                .and_then(Value::as_int)
                .unwrap_or(0);
            Value::Bytes(total.to_string().into_bytes())
        }))
        .then(Operation::create_from_previous(DataKind::new("Blob")).bound_to(&objects));

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();

    // The pipeline result reflects the object store's create response.
    let PipelineData::Stored(items) = result else {
        panic!("expected stored (item, address) pairs");
    };
    assert_eq!(items.len(), 1);
    assert!(items[0].address.starts_with("Blob/"));
    assert!(items[0].address.ends_with(".bin"));

    // The scalar 55 landed as a single raw byte blob.
    let bytes = client.get(&items[0].address).await.unwrap();
    assert_eq!(bytes, b"55".to_vec());
}

#[tokio::test]
async fn test_target_switch_executes_source_once() {
    init_tracing();
    let registry = registry();
    let sql_storage = Arc::new(MemoryStorage::new("sql", Arc::clone(&registry)));
    let sql = Target::new(sql_storage.clone());
    let (object_storage, client) = object_backend(&registry);
    let objects = Target::new(object_storage);

    PipelineExecutor::new()
        .execute(
            &Operation::create(user_kind(), [user(25), user(30)])
                .bound_to(&sql)
                .then(Operation::filter(Predicate::ge("age", 0))),
        )
        .await
        .unwrap();

    // Two adjacent bound operations with different targets: the composed
    // switch carries the read and executes it exactly once.
    let pipeline = Operation::read(ParamIndex::new(user_kind()))
        .bound_to(&sql)
        .then(Operation::create_from_previous(user_kind()).bound_to(&objects));

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();

    // One object per row read; nothing doubled.
    assert_eq!(result.len(), 2);
    assert_eq!(client.object_count(), 2);
    assert_eq!(sql_storage.committed_rows("users").len(), 2);
}

#[tokio::test]
async fn test_stored_pairs_reduce_to_items_across_backends() {
    init_tracing();
    let registry = registry();
    let (object_storage, _client) = object_backend(&registry);
    let objects = Target::new(object_storage);
    let sql_storage = Arc::new(MemoryStorage::new("sql", Arc::clone(&registry)));
    let sql = Target::new(sql_storage.clone());

    // Object create returns (item, address) pairs; the relational create
    // downstream receives just the items.
    let pipeline = Operation::create(user_kind(), [user(41)])
        .bound_to(&objects)
        .then(Operation::create_from_previous(user_kind()).bound_to(&sql));

    let result = PipelineExecutor::new().execute(&pipeline).await.unwrap();

    assert_eq!(result.into_items(), vec![user(41)]);
    let committed = sql_storage.committed_rows("users");
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].get("age"), Some(&Value::Int(41)));
}

#[tokio::test]
async fn test_concurrent_pipelines_do_not_interfere() {
    init_tracing();
    let registry = registry();
    let storage = Arc::new(MemoryStorage::new("sql", Arc::clone(&registry)));
    let sql = Target::new(storage.clone());

    let run = |age: i64| {
        let sql = sql.clone();
        async move {
            let pipeline = Operation::create(user_kind(), [user(age)])
                .bound_to(&sql)
                .then(Operation::filter(Predicate::ge("age", 0)));
            PipelineExecutor::new().execute(&pipeline).await
        }
    };

    let (a, b) = tokio::join!(run(1), run(2));
    a.unwrap();
    b.unwrap();
    // Both groups committed; the registry and executor hold no per-call
    // state, so neither pipeline observed the other mid-flight.
    assert!(!storage.committed_rows("users").is_empty());
}
