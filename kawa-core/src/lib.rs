//! # Kawa Core
//!
//! Operation algebra and backend contract for the kawa data-access engine.
//!
//! Callers describe CRUD and functional transformations as composable,
//! immutable operations, bind them to storage targets, and hand the
//! composed pipeline to the engine (`kawa-store`) for validation,
//! optimization and execution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              kawa-core                       │
//! ├─────────────────────────────────────────────┤
//! │  SearchIndex / Registry  │ typed lookups    │
//! │  Operation algebra       │ what, never how  │
//! │  Pipeline composition    │ then / bound_to  │
//! │  Validator               │ fail before run  │
//! │  Storage contract        │ consumed by the  │
//! │                          │ executor         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use kawa_core::index::ParamIndex;
//! use kawa_core::operation::Operation;
//! use kawa_core::predicate::Predicate;
//! use kawa_core::validator::validate;
//! use kawa_core::value::{DataKind, Value};
//!
//! // An unbound pipeline: read would need a target to execute, but the
//! // shape is already checkable.
//! let pipeline = Operation::create(
//!     DataKind::new("User"),
//!     [Value::record([("age", Value::from(25))])],
//! )
//! .then(Operation::filter(Predicate::ge("age", 18)));
//!
//! assert!(validate(&pipeline).is_ok());
//! ```
//!
//! Operations are values: no operation owns or mutates shared state, and
//! every composition step returns a new immutable value. Execution order
//! is always the flattened left-to-right sequence.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod error;
pub mod index;
pub mod operation;
pub mod patch;
pub mod pipeline;
pub mod predicate;
pub mod registry;
pub mod storage;
pub mod validator;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common types
pub use constants::*;
pub use error::{StorageError, StoreResult};
pub use index::{NativeQuery, ParamIndex, PathIndex, QueryIndex, SearchIndex, VectorIndex};
pub use operation::{Literal, Operation};
pub use patch::Patch;
pub use pipeline::{
    Bindable, FlatNode, Pipeline, PipelineNode, Target, TargetBoundOperation, TargetSwitch,
};
pub use predicate::{CmpOp, Condition, Predicate};
pub use registry::{DataTypeRegistry, RegistryError, TypeRegistration};
pub use storage::{PipelineData, Storage, StorageTransaction, StoredItem};
pub use validator::{validate, ValidationError, ValidationErrorKind};
pub use value::{DataKind, Value};
