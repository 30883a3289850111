//! Pipeline Optimizer
//!
//! Relational-family plan analysis: decides how much of an operation
//! sequence can be pushed into a single native query versus executed
//! in-process, and folds convertible conditions into one optimized
//! operation.
//!
//! ```text
//! [read, filter(convertible), filter(convertible)]          -> Storage
//! [read, filter(convertible), map(..)]                      -> Hybrid
//! [map(..), transform(..)]                                  -> InProcess
//! [read, filter*, update(fields) / delete]                  -> Storage
//! ```
//!
//! Classification is conservative: a filter is pushable only when its
//! predicate converts under the documented rules, an update only when its
//! patch is a field diff, a create only when it opens the sequence (a
//! create fed by a previous result merges in-process first). Map, reduce
//! and transform never push down.
//!
//! Folding composes the `NativeQuery` descriptor purely; compiling the
//! descriptor to backend SQL happens inside the executing transaction.
//!
//! Field names in parameters and predicates address the storage-side
//! representation. Registrations whose converters rename fields must keep
//! their filters in-process (`Predicate::func`).

use std::sync::Arc;

use tracing::debug;

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::index::{NativeQuery, QueryIndex, SearchIndex};
use kawa_core::operation::Operation;
use kawa_core::pipeline::Pipeline;
use kawa_core::predicate::{CmpOp, Condition};
use kawa_core::registry::DataTypeRegistry;
use kawa_core::value::DataKind;

// =============================================================================
// Analysis result
// =============================================================================

/// The optimizer's verdict for an operation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// The whole sequence runs as one native operation
    Storage,
    /// A folded prefix runs natively; the suffix runs in-process
    Hybrid,
    /// No pushdown; operations execute one by one
    InProcess,
}

/// Output of [`SqlPipelineOptimizer::analyze`]. Produced per execution,
/// never persisted.
#[derive(Debug, Clone)]
pub struct PipelineAnalysis {
    /// Chosen plan
    pub execution_plan: ExecutionPlan,
    /// The folded operation, for `Storage` and `Hybrid` plans
    pub optimized: Option<Operation>,
    /// Operations left to run after the folded one, in order
    pub remaining: Vec<Operation>,
}

// =============================================================================
// Optimizer
// =============================================================================

/// Pipeline optimizer for relational-family backends.
///
/// Other backend families follow the same shape with their own
/// convertibility rules; path-addressed stores have nothing to push down
/// and skip analysis entirely.
#[derive(Debug, Clone)]
pub struct SqlPipelineOptimizer {
    registry: Arc<DataTypeRegistry>,
}

impl SqlPipelineOptimizer {
    /// Create an optimizer resolving table names through the registry.
    #[must_use]
    pub fn new(registry: Arc<DataTypeRegistry>) -> Self {
        Self { registry }
    }

    /// Analyze a composed pipeline.
    ///
    /// # Errors
    /// A pipeline containing a target switch is invalid input here: a
    /// hand-off cannot execute inside one backend.
    pub fn analyze_pipeline(&self, pipeline: &Pipeline) -> StoreResult<PipelineAnalysis> {
        let operations = pipeline.operations().ok_or_else(|| {
            StorageError::query("a pipeline with a target switch cannot be optimized")
        })?;
        self.analyze(&operations)
    }

    /// Analyze an ordered operation sequence.
    ///
    /// # Errors
    /// Registry ambiguity while resolving a table name.
    pub fn analyze(&self, operations: &[Operation]) -> StoreResult<PipelineAnalysis> {
        // Split at the first non-pushable operation.
        let split = operations
            .iter()
            .enumerate()
            .position(|(position, op)| !Self::is_pushable(op, position > 0))
            .unwrap_or(operations.len());
        let (prefix, suffix) = operations.split_at(split);

        let analysis = self.fold_prefix(prefix, suffix)?;
        debug!(
            plan = ?analysis.execution_plan,
            pushed = prefix.len(),
            remaining = analysis.remaining.len(),
            "analyzed pipeline"
        );
        Ok(analysis)
    }

    /// Whether one operation can execute natively at its position.
    fn is_pushable(operation: &Operation, has_previous: bool) -> bool {
        match operation {
            Operation::Read(_) | Operation::Delete(_) => true,
            // A create fed by a previous result merges in-process first.
            Operation::Create(_) => !has_previous,
            // Transform patches run per-record in-process.
            Operation::Update(op) => op.patch.is_convertible(),
            Operation::Filter(op) => op.predicate.is_convertible(),
            Operation::Map(_) | Operation::Reduce(_) | Operation::Transform(_) => false,
        }
    }

    /// Fold the pushable prefix into one optimized operation.
    fn fold_prefix(
        &self,
        prefix: &[Operation],
        suffix: &[Operation],
    ) -> StoreResult<PipelineAnalysis> {
        if prefix.is_empty() {
            return Ok(PipelineAnalysis {
                execution_plan: ExecutionPlan::InProcess,
                optimized: None,
                remaining: suffix.to_vec(),
            });
        }

        // A single operation needs no folding.
        if prefix.len() == 1 {
            return Ok(Self::plan_with(prefix[0].clone(), 1, prefix, suffix));
        }

        // Folding anchors on a leading read; without one the sequence
        // stays unmodified and runs operation by operation.
        let Operation::Read(read) = &prefix[0] else {
            return Ok(PipelineAnalysis {
                execution_plan: ExecutionPlan::InProcess,
                optimized: None,
                remaining: prefix.iter().chain(suffix).cloned().collect(),
            });
        };

        let Some(mut query) = self.base_query(&read.index)? else {
            // Path or vector reads carry no foldable query; run the read
            // alone and leave the rest for the sequence loop.
            return Ok(Self::plan_with(prefix[0].clone(), 1, prefix, suffix));
        };

        // Fold consecutive convertible filters into the query.
        let mut consumed = 1;
        while consumed < prefix.len() {
            let Operation::Filter(filter) = &prefix[consumed] else {
                break;
            };
            let Some(conditions) = filter.predicate.to_conditions() else {
                break;
            };
            query = query.with_conditions(conditions);
            consumed += 1;
        }

        // A terminal update or delete over the same table folds into a
        // single native statement carrying all collected conditions.
        if consumed == prefix.len() - 1 {
            match &prefix[consumed] {
                Operation::Update(update) if update.patch.is_convertible() => {
                    if let Some(folded) = self.fold_terminal(&update.index, &query)? {
                        let optimized = Operation::update(
                            QueryIndex::new("folded_update", folded),
                            update.patch.clone(),
                        );
                        return Ok(Self::plan_with(optimized, consumed + 1, prefix, suffix));
                    }
                }
                Operation::Delete(delete) => {
                    if let Some(folded) = self.fold_terminal(&delete.index, &query)? {
                        let optimized =
                            Operation::delete(QueryIndex::new("folded_delete", folded));
                        return Ok(Self::plan_with(optimized, consumed + 1, prefix, suffix));
                    }
                }
                _ => {}
            }
        }

        let optimized = Operation::read(QueryIndex::new("folded_read", query));
        Ok(Self::plan_with(optimized, consumed, prefix, suffix))
    }

    /// Build the analysis once the folded operation and how much of the
    /// prefix it consumed are known.
    fn plan_with(
        optimized: Operation,
        consumed: usize,
        prefix: &[Operation],
        suffix: &[Operation],
    ) -> PipelineAnalysis {
        let remaining: Vec<Operation> = prefix[consumed..].iter().chain(suffix).cloned().collect();
        PipelineAnalysis {
            execution_plan: if remaining.is_empty() {
                ExecutionPlan::Storage
            } else {
                ExecutionPlan::Hybrid
            },
            optimized: Some(optimized),
            remaining,
        }
    }

    /// The query a read index folds into, `None` for unfoldable variants.
    fn base_query(&self, index: &SearchIndex) -> StoreResult<Option<NativeQuery>> {
        match index {
            SearchIndex::Params(params) => {
                let table = self.resolve_table(params.data_kind())?;
                let conditions = params
                    .params()
                    .iter()
                    .map(|(field, value)| Condition::new(field.clone(), CmpOp::Eq, value.clone()));
                Ok(Some(NativeQuery::table(table).with_conditions(conditions)))
            }
            SearchIndex::Query(query) => Ok(Some(query.query().clone())),
            SearchIndex::Path(_) | SearchIndex::Vector(_) => Ok(None),
        }
    }

    /// Merge a terminal update/delete index into the collected query.
    /// `None` when the indexes target different tables.
    fn fold_terminal(
        &self,
        index: &SearchIndex,
        query: &NativeQuery,
    ) -> StoreResult<Option<NativeQuery>> {
        let Some(own) = self.base_query(index)? else {
            return Ok(None);
        };
        if own.table != query.table {
            return Ok(None);
        }
        Ok(Some(
            query.clone().with_conditions(own.conditions),
        ))
    }

    /// Table name for a user kind: its registered storage kind, or the
    /// kind name itself when nothing is registered.
    fn resolve_table(&self, kind: &DataKind) -> StoreResult<String> {
        Ok(self
            .registry
            .get_for_user_kind(kind, None)?
            .map_or_else(|| kind.as_str().to_string(), |r| r.storage_kind.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kawa_core::index::ParamIndex;
    use kawa_core::patch::Patch;
    use kawa_core::predicate::Predicate;
    use kawa_core::value::Value;

    fn optimizer() -> SqlPipelineOptimizer {
        let mut registry = DataTypeRegistry::new();
        registry.register_identity(DataKind::new("users"), DataKind::new("User"));
        SqlPipelineOptimizer::new(Arc::new(registry))
    }

    fn read_all() -> Operation {
        Operation::read(ParamIndex::new(DataKind::new("User")))
    }

    #[test]
    fn test_plan_law_single_read_is_storage() {
        let analysis = optimizer().analyze(&[read_all()]).unwrap();
        assert_eq!(analysis.execution_plan, ExecutionPlan::Storage);
        assert!(analysis.remaining.is_empty());
        assert_eq!(analysis.optimized.unwrap().name(), "read");
    }

    #[test]
    fn test_plan_law_read_convertible_filter_is_storage() {
        let ops = [read_all(), Operation::filter(Predicate::ge("age", 30))];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::Storage);
        let Some(Operation::Read(read)) = analysis.optimized else {
            panic!("expected folded read");
        };
        let SearchIndex::Query(query) = &read.index else {
            panic!("expected query index");
        };
        assert_eq!(query.query().table, "users");
        assert_eq!(query.query().conditions.len(), 1);
        assert_eq!(query.query().conditions[0].op, CmpOp::Ge);
    }

    #[test]
    fn test_plan_law_read_map_is_hybrid() {
        let ops = [read_all(), Operation::map(|v, _| v.clone())];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::Hybrid);
        assert_eq!(analysis.remaining.len(), 1);
        assert_eq!(analysis.remaining[0].name(), "map");
    }

    #[test]
    fn test_plan_law_no_read_anchor_is_in_process() {
        let ops = [
            Operation::map(|v, _| v.clone()),
            Operation::transform(Value::List),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::InProcess);
        assert!(analysis.optimized.is_none());
        assert_eq!(analysis.remaining.len(), 2);
    }

    #[test]
    fn test_opaque_predicate_splits_the_sequence() {
        let ops = [
            read_all(),
            Operation::filter(Predicate::ge("age", 18)),
            Operation::filter(Predicate::func(|v| v.get("age").is_some())),
            Operation::filter(Predicate::lt("age", 65)),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        // The opaque filter and everything after it stay in-process.
        assert_eq!(analysis.execution_plan, ExecutionPlan::Hybrid);
        assert_eq!(analysis.remaining.len(), 2);
        let Some(Operation::Read(read)) = analysis.optimized else {
            panic!("expected folded read");
        };
        let SearchIndex::Query(query) = &read.index else {
            panic!("expected query index");
        };
        assert_eq!(query.query().conditions.len(), 1);
    }

    #[test]
    fn test_param_conditions_fold_into_query() {
        let index = ParamIndex::new(DataKind::new("User")).with("active", true);
        let ops = [
            Operation::read(index),
            Operation::filter(Predicate::ge("age", 21)),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        let Some(Operation::Read(read)) = analysis.optimized else {
            panic!("expected folded read");
        };
        let SearchIndex::Query(query) = &read.index else {
            panic!("expected query index");
        };
        assert_eq!(query.query().conditions.len(), 2);
    }

    #[test]
    fn test_read_filter_delete_folds_into_one_delete() {
        let ops = [
            read_all(),
            Operation::filter(Predicate::lt("age", 18)),
            Operation::delete(ParamIndex::new(DataKind::new("User"))),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::Storage);
        let Some(Operation::Delete(delete)) = analysis.optimized else {
            panic!("expected folded delete");
        };
        let SearchIndex::Query(query) = &delete.index else {
            panic!("expected query index");
        };
        assert_eq!(query.query().conditions.len(), 1);
    }

    #[test]
    fn test_transform_patch_stays_in_process() {
        let ops = [
            read_all(),
            Operation::update(
                ParamIndex::new(DataKind::new("User")),
                Patch::transform(|record| record.clone()),
            ),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::Hybrid);
        assert_eq!(analysis.remaining.len(), 1);
        assert_eq!(analysis.remaining[0].name(), "update");
    }

    #[test]
    fn test_create_mid_sequence_is_not_pushed() {
        let ops = [
            read_all(),
            Operation::create_from_previous(DataKind::new("User")),
        ];
        let analysis = optimizer().analyze(&ops).unwrap();

        assert_eq!(analysis.execution_plan, ExecutionPlan::Hybrid);
        assert_eq!(analysis.remaining.len(), 1);
        assert_eq!(analysis.remaining[0].name(), "create");
    }

    #[test]
    fn test_switch_is_rejected() {
        use kawa_core::pipeline::Target;
        use kawa_core::storage::{PipelineData, Storage, StorageTransaction};
        use kawa_core::error::StorageError as CoreError;

        struct Stub;
        #[async_trait::async_trait]
        impl Storage for Stub {
            fn name(&self) -> &str {
                "stub"
            }
            async fn begin(&self) -> StoreResult<Box<dyn StorageTransaction>> {
                Err(CoreError::backend("stub"))
            }
            async fn execute(
                &self,
                _: &Operation,
                _: &mut dyn StorageTransaction,
                _: Option<&PipelineData>,
            ) -> StoreResult<PipelineData> {
                Err(CoreError::backend("stub"))
            }
            async fn execute_sequence(
                &self,
                _: &[Operation],
                _: &mut dyn StorageTransaction,
                _: Option<&PipelineData>,
            ) -> StoreResult<PipelineData> {
                Err(CoreError::backend("stub"))
            }
        }

        let a = Target::new(Arc::new(Stub));
        let b = Target::new(Arc::new(Stub));
        let pipeline = read_all()
            .bound_to(&a)
            .then(Operation::create_from_previous(DataKind::new("User")).bound_to(&b));

        let err = optimizer().analyze_pipeline(&pipeline).unwrap_err();
        assert!(matches!(err, CoreError::Query { .. }));
    }
}
