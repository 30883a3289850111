//! # Kawa Store
//!
//! The engine half of kawa: pipeline optimizer, multi-target executor and
//! storage backends for the operation algebra defined in `kawa-core`.
//!
//! ## Features
//!
//! - **Query pushdown**: convertible filters fold into one native query;
//!   unsupported shapes fall back to in-process execution, never silently
//!   misbehave
//! - **Transaction grouping**: consecutive same-target operations run in
//!   one transaction; a failing group rolls back without touching earlier
//!   committed groups
//! - **Heterogeneous hand-off**: results cross backend boundaries through
//!   target switches and group boundaries
//! - **Simulation-first**: the in-memory backend is deterministic, with
//!   fault injection for abort-path testing
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use kawa_core::index::ParamIndex;
//! use kawa_core::operation::Operation;
//! use kawa_core::pipeline::Target;
//! use kawa_core::predicate::Predicate;
//! use kawa_core::registry::DataTypeRegistry;
//! use kawa_core::value::{DataKind, Value};
//! use kawa_store::executor::PipelineExecutor;
//! use kawa_store::memory::MemoryStorage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(DataTypeRegistry::new());
//! let sql = Target::new(Arc::new(MemoryStorage::new("sql", registry)));
//!
//! let user = |age: i64| Value::record([("age", Value::from(age))]);
//! let pipeline = Operation::create(DataKind::new("User"), [user(25), user(30)])
//!     .bound_to(&sql)
//!     .then(Operation::read(ParamIndex::new(DataKind::new("User"))).bound_to(&sql))
//!     .then(Operation::filter(Predicate::ge("age", 30)));
//!
//! let result = PipelineExecutor::new().execute(&pipeline).await?;
//! assert_eq!(result.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL backend (sqlx)
//!
//! ## Backends
//!
//! | Backend | Family | Indexes | Transactions |
//! |---|---|---|---|
//! | [`memory::MemoryStorage`] | relational | params, query, vector | snapshot |
//! | `postgres::PostgresStorage` | relational | params, query | native |
//! | [`object::ObjectStorage`] | path-addressed | path | none (immediate) |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod executor;
pub mod inprocess;
pub mod memory;
pub mod object;
pub mod optimizer;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export common types
pub use config::{ObjectConfig, PostgresConfig};
pub use executor::PipelineExecutor;
pub use memory::{FaultPlan, MemoryStorage};
pub use object::{MemoryObjectClient, ObjectClient, ObjectMeta, ObjectStorage};
pub use optimizer::{ExecutionPlan, PipelineAnalysis, SqlPipelineOptimizer};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
