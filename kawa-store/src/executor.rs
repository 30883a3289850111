//! Pipeline Executor
//!
//! Runs a composed, possibly multi-backend pipeline with transactional
//! and ordering guarantees.
//!
//! # Algorithm
//!
//! 1. Validate, then flatten the composition tree into left-to-right
//!    order.
//! 2. Group maximal runs of operations bound to the same target. A target
//!    switch, a change of target, or an unbound operation terminates the
//!    group.
//! 3. Execute units strictly in order:
//!    - a group runs inside one transaction scope (commit on success,
//!      roll back on error — the atomicity unit);
//!    - a switch executes its carried source operation on the source
//!      backend, then feeds the result to the next operation on the
//!      destination backend in a fresh scope;
//!    - an unbound node executes in-process against the accumulated
//!      previous result.
//!
//! There is no cross-group rollback: a failed group leaves earlier,
//! already-committed groups intact. Callers needing all-or-nothing
//! semantics compose their operations into a single same-target group.
//!
//! Transactions are consumed on commit/rollback, so a closed scope cannot
//! leak into later units.

use tracing::{debug, error};

use kawa_core::error::{StorageError, StoreResult};
use kawa_core::operation::Operation;
use kawa_core::pipeline::{Bindable, FlatNode, Pipeline, Target, TargetSwitch};
use kawa_core::storage::PipelineData;
use kawa_core::validator::validate;

use crate::inprocess;

/// One schedulable element of a flattened pipeline.
enum Unit<'a> {
    /// Maximal run of same-target bound operations: one transaction
    Group {
        target: &'a Target,
        members: Vec<&'a Bindable>,
    },
    /// Unbound operation, executed in-process
    InProcess(&'a Operation),
    /// Backend hand-off
    Switch(&'a TargetSwitch),
}

/// Executes pipelines across targets. Holds no per-call state; one
/// executor may serve any number of concurrent pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate and execute a pipeline, returning the final result.
    ///
    /// # Errors
    /// Validation errors before any execution; contract violations and
    /// backend errors during it. A failing group is rolled back; earlier
    /// groups stay committed.
    pub async fn execute(&self, pipeline: &Pipeline) -> StoreResult<PipelineData> {
        validate(pipeline)?;

        let nodes = pipeline.flatten();
        let units = Self::build_units(&nodes);
        debug!(nodes = nodes.len(), units = units.len(), "executing pipeline");

        let mut previous: Option<PipelineData> = None;
        for unit in &units {
            let result = match unit {
                Unit::Group { target, members } => {
                    debug!(storage = target.name(), members = members.len(), "executing group");
                    Self::run_on_target(target, members, previous.as_ref()).await?
                }
                Unit::InProcess(operation) => {
                    debug!(operation = operation.name(), "executing in-process");
                    inprocess::apply(operation, previous.as_ref())?
                }
                Unit::Switch(switch) => {
                    debug!(
                        source = switch.source_target.name(),
                        destination = switch.target_target.name(),
                        "executing target switch"
                    );
                    Self::run_switch(switch, previous.as_ref()).await?
                }
            };
            previous = Some(result);
        }

        Ok(previous.unwrap_or_else(PipelineData::empty))
    }

    /// Merge the flattened nodes into execution units.
    ///
    /// A bound node immediately followed by a switch from the same target
    /// is subsumed by the switch, which carries and executes the source
    /// operation itself; keeping both would run it twice.
    fn build_units<'a>(nodes: &[FlatNode<'a>]) -> Vec<Unit<'a>> {
        let mut units: Vec<Unit<'a>> = Vec::new();
        let mut group: Option<(&'a Target, Vec<&'a Bindable>)> = None;

        for (position, node) in nodes.iter().enumerate() {
            match *node {
                FlatNode::Bound(bound) => {
                    let subsumed = matches!(
                        nodes.get(position + 1),
                        Some(FlatNode::Switch(switch)) if switch.source_target == bound.target
                    );
                    if subsumed {
                        continue;
                    }
                    match &mut group {
                        Some((target, members)) if *target == &bound.target => {
                            members.push(&bound.operation);
                        }
                        _ => {
                            Self::close_group(&mut group, &mut units);
                            group = Some((&bound.target, vec![&bound.operation]));
                        }
                    }
                }
                FlatNode::Op(operation) => {
                    Self::close_group(&mut group, &mut units);
                    units.push(Unit::InProcess(operation));
                }
                FlatNode::Switch(switch) => {
                    Self::close_group(&mut group, &mut units);
                    units.push(Unit::Switch(switch));
                }
            }
        }
        Self::close_group(&mut group, &mut units);
        units
    }

    fn close_group<'a>(
        group: &mut Option<(&'a Target, Vec<&'a Bindable>)>,
        units: &mut Vec<Unit<'a>>,
    ) {
        if let Some((target, members)) = group.take() {
            units.push(Unit::Group { target, members });
        }
    }

    /// Run a member sequence on one target inside a single transaction.
    ///
    /// Opens the scope, runs every member against it, commits on normal
    /// exit and rolls back on the first error. Results are materialized
    /// by construction before the scope closes.
    async fn run_on_target(
        target: &Target,
        members: &[&Bindable],
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        let storage = target.storage();
        let mut transaction = storage.begin().await?;
        let mut result = previous.cloned();

        for member in members {
            let step = match member {
                Bindable::Op(operation) => {
                    // A create merges its pipeline input before it reaches
                    // the backend.
                    if let Operation::Create(create) = operation {
                        let resolved = inprocess::resolve_create(create, result.as_ref());
                        storage
                            .execute(&resolved, transaction.as_mut(), None)
                            .await
                    } else {
                        storage
                            .execute(operation, transaction.as_mut(), result.as_ref())
                            .await
                    }
                }
                Bindable::Pipe(pipeline) => match pipeline.operations() {
                    Some(operations) => {
                        storage
                            .execute_sequence(&operations, transaction.as_mut(), result.as_ref())
                            .await
                    }
                    None => Err(StorageError::query(
                        "bound sub-pipeline contains a target switch",
                    )),
                },
            };

            match step {
                Ok(data) => result = Some(data),
                Err(failure) => {
                    if let Err(rollback_failure) = transaction.rollback().await {
                        error!(error = %rollback_failure, "rollback failed");
                    }
                    return Err(failure);
                }
            }
        }

        transaction.commit().await?;
        Ok(result.unwrap_or_else(PipelineData::empty))
    }

    /// Execute a hand-off: source operation on the source backend, then
    /// the next operation on the destination backend in a fresh scope.
    async fn run_switch(
        switch: &TargetSwitch,
        previous: Option<&PipelineData>,
    ) -> StoreResult<PipelineData> {
        let source = Self::run_on_target(
            &switch.source_target,
            &[&switch.source_operation],
            previous,
        )
        .await?;

        match &switch.next_operation {
            // In-process kinds consume the source result directly.
            Bindable::Op(operation) if operation.needs_previous_result() => {
                inprocess::apply(operation, Some(&source))
            }
            bindable => {
                Self::run_on_target(&switch.target_target, &[bindable], Some(&source)).await
            }
        }
    }
}
