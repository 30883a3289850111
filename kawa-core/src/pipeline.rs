//! Pipeline Composition
//!
//! Operations compose into a binary tree with explicit builder methods:
//! `.then(next)` for sequential composition, `.bound_to(target)` for
//! target binding. Every composition returns a new immutable value.
//!
//! ```text
//! read(users) ─ then ─ filter(age >= 18) ─ then ─ create()
//!      │                                             │
//!   bound_to(sql)                                bound_to(objects)
//! ```
//!
//! Composition is left-associative: `a.then(b).then(c)` builds
//! `Pipeline(Pipeline(a, b), c)`. Execution always works on the flattened
//! left-to-right sequence `[a, b, c]`, never on the tree shape.
//!
//! When two adjacent bound operations target different backends, a
//! [`TargetSwitch`] is synthesized to describe the hand-off: source
//! operation, source target, destination target and next operation.

use std::fmt;
use std::sync::Arc;

use crate::constants::PIPELINE_OPERATIONS_COUNT_MAX;
use crate::operation::Operation;
use crate::storage::Storage;

// =============================================================================
// Target
// =============================================================================

/// A concrete backend instance an operation is bound to.
///
/// Cheap to clone; identity is the backend instance itself (pointer
/// equality), so two handles to the same backend compare equal and two
/// backends of the same type do not.
#[derive(Clone)]
pub struct Target {
    storage: Arc<dyn Storage>,
}

impl Target {
    /// Wrap a backend as a bind target.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.storage.name()
    }

    /// The underlying backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.name())
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// Payload of a target binding: one operation or a whole sub-pipeline.
#[derive(Debug, Clone)]
pub enum Bindable {
    /// Single operation
    Op(Operation),
    /// Sub-pipeline executed as one unit on the target
    Pipe(Box<Pipeline>),
}

impl Bindable {
    /// The single operation, `None` for sub-pipelines.
    #[must_use]
    pub fn as_operation(&self) -> Option<&Operation> {
        match self {
            Self::Op(op) => Some(op),
            Self::Pipe(_) => None,
        }
    }

    /// The sub-pipeline, `None` for single operations.
    #[must_use]
    pub fn as_pipeline(&self) -> Option<&Pipeline> {
        match self {
            Self::Op(_) => None,
            Self::Pipe(pipeline) => Some(pipeline),
        }
    }
}

impl From<Operation> for Bindable {
    fn from(op: Operation) -> Self {
        Self::Op(op)
    }
}

impl From<Pipeline> for Bindable {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipe(Box::new(pipeline))
    }
}

/// An operation (or sub-pipeline) bound to one backend.
#[derive(Debug, Clone)]
pub struct TargetBoundOperation {
    /// What to execute
    pub operation: Bindable,
    /// Where to execute it
    pub target: Target,
}

impl TargetBoundOperation {
    /// Bind an operation or pipeline to a target.
    #[must_use]
    pub fn new(operation: impl Into<Bindable>, target: &Target) -> Self {
        Self {
            operation: operation.into(),
            target: target.clone(),
        }
    }

    /// Rebind to a different target, replacing the current one.
    #[must_use]
    pub fn bound_to(self, target: &Target) -> Self {
        Self {
            operation: self.operation,
            target: target.clone(),
        }
    }

    /// Continue the pipeline. Composing with an operation bound to a
    /// *different* target synthesizes a [`TargetSwitch`] describing the
    /// hand-off.
    #[must_use]
    pub fn then(self, next: impl Into<PipelineNode>) -> Pipeline {
        match next.into() {
            PipelineNode::Bound(other) if other.target != self.target => {
                let switch = TargetSwitch {
                    source_operation: self.operation.clone(),
                    source_target: self.target.clone(),
                    target_target: other.target,
                    next_operation: other.operation,
                };
                Pipeline {
                    first: PipelineNode::Bound(self),
                    second: PipelineNode::Switch(switch),
                }
            }
            node => Pipeline {
                first: PipelineNode::Bound(self),
                second: node,
            },
        }
    }
}

/// A required data hand-off between two backends.
///
/// Synthesized during composition; carries the source operation so the
/// hand-off is self-contained. The executor treats a switch as subsuming
/// its immediately preceding bound source node, so the source operation
/// executes exactly once.
#[derive(Debug, Clone)]
pub struct TargetSwitch {
    /// Operation producing the data on the source backend
    pub source_operation: Bindable,
    /// Backend the data comes from
    pub source_target: Target,
    /// Backend the data goes to
    pub target_target: Target,
    /// Operation consuming the data on the destination backend
    pub next_operation: Bindable,
}

impl TargetSwitch {
    /// Continue the pipeline after the switch.
    #[must_use]
    pub fn then(self, next: impl Into<PipelineNode>) -> Pipeline {
        Pipeline {
            first: PipelineNode::Switch(self),
            second: next.into(),
        }
    }
}

/// One side of a pipeline's binary composition node.
#[derive(Debug, Clone)]
pub enum PipelineNode {
    /// Unbound operation (executes in-process unless CRUD)
    Op(Operation),
    /// Nested pipeline
    Pipe(Box<Pipeline>),
    /// Target-bound operation
    Bound(TargetBoundOperation),
    /// Backend hand-off
    Switch(TargetSwitch),
}

impl From<Operation> for PipelineNode {
    fn from(op: Operation) -> Self {
        Self::Op(op)
    }
}

impl From<Pipeline> for PipelineNode {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipe(Box::new(pipeline))
    }
}

impl From<TargetBoundOperation> for PipelineNode {
    fn from(bound: TargetBoundOperation) -> Self {
        Self::Bound(bound)
    }
}

impl From<TargetSwitch> for PipelineNode {
    fn from(switch: TargetSwitch) -> Self {
        Self::Switch(switch)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A composed sequence of operations, built as a binary tree and executed
/// left-to-right.
#[derive(Debug, Clone)]
pub struct Pipeline {
    first: PipelineNode,
    second: PipelineNode,
}

impl Pipeline {
    /// Compose two nodes.
    #[must_use]
    pub fn new(first: impl Into<PipelineNode>, second: impl Into<PipelineNode>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// First side of the composition.
    #[must_use]
    pub fn first(&self) -> &PipelineNode {
        &self.first
    }

    /// Second side of the composition.
    #[must_use]
    pub fn second(&self) -> &PipelineNode {
        &self.second
    }

    /// Continue the pipeline.
    #[must_use]
    pub fn then(self, next: impl Into<PipelineNode>) -> Pipeline {
        Pipeline {
            first: PipelineNode::Pipe(Box::new(self)),
            second: next.into(),
        }
    }

    /// Bind the whole pipeline to one target; it will execute there as a
    /// single unit (one transaction, backend optimizer engaged).
    #[must_use]
    pub fn bound_to(self, target: &Target) -> TargetBoundOperation {
        TargetBoundOperation::new(self, target)
    }

    /// Flatten the composition tree into the ordered execution sequence.
    ///
    /// Left-associative composition nests the head of the pipeline ever
    /// deeper in `first`; flattening restores `[a, b, c, d]` order.
    ///
    /// # Panics
    /// Panics if the pipeline exceeds the operation count limit.
    #[must_use]
    pub fn flatten(&self) -> Vec<FlatNode<'_>> {
        fn collect<'a>(node: &'a PipelineNode, out: &mut Vec<FlatNode<'a>>) {
            match node {
                PipelineNode::Pipe(pipeline) => {
                    collect(&pipeline.first, out);
                    collect(&pipeline.second, out);
                }
                PipelineNode::Op(op) => out.push(FlatNode::Op(op)),
                PipelineNode::Bound(bound) => out.push(FlatNode::Bound(bound)),
                PipelineNode::Switch(switch) => out.push(FlatNode::Switch(switch)),
            }
        }

        let mut nodes = Vec::new();
        collect(&self.first, &mut nodes);
        collect(&self.second, &mut nodes);

        // Postcondition
        assert!(
            nodes.len() <= PIPELINE_OPERATIONS_COUNT_MAX,
            "pipeline has {} nodes, exceeds max {}",
            nodes.len(),
            PIPELINE_OPERATIONS_COUNT_MAX
        );
        nodes
    }

    /// Unwrap the flattened pipeline into plain operations, discarding
    /// target bindings. Backends and optimizers work on this form.
    ///
    /// Returns `None` when the pipeline contains a [`TargetSwitch`]: a
    /// hand-off cannot execute inside a single backend.
    #[must_use]
    pub fn operations(&self) -> Option<Vec<Operation>> {
        fn unwrap_bindable(bindable: &Bindable, out: &mut Vec<Operation>) -> Option<()> {
            match bindable {
                Bindable::Op(op) => out.push(op.clone()),
                Bindable::Pipe(pipeline) => out.extend(pipeline.operations()?),
            }
            Some(())
        }

        let mut operations = Vec::new();
        for node in self.flatten() {
            match node {
                FlatNode::Op(op) => operations.push(op.clone()),
                FlatNode::Bound(bound) => unwrap_bindable(&bound.operation, &mut operations)?,
                FlatNode::Switch(_) => return None,
            }
        }
        Some(operations)
    }
}

impl Operation {
    /// Start a pipeline with this operation.
    #[must_use]
    pub fn then(self, next: impl Into<PipelineNode>) -> Pipeline {
        Pipeline {
            first: PipelineNode::Op(self),
            second: next.into(),
        }
    }

    /// Bind this operation to a target.
    #[must_use]
    pub fn bound_to(self, target: &Target) -> TargetBoundOperation {
        TargetBoundOperation::new(self, target)
    }
}

// =============================================================================
// FlatNode
// =============================================================================

/// One element of a flattened pipeline.
#[derive(Debug, Clone, Copy)]
pub enum FlatNode<'a> {
    /// Unbound operation
    Op(&'a Operation),
    /// Target-bound operation or sub-pipeline
    Bound(&'a TargetBoundOperation),
    /// Backend hand-off
    Switch(&'a TargetSwitch),
}

impl<'a> FlatNode<'a> {
    /// The underlying operation, `None` when the node wraps a sub-pipeline.
    #[must_use]
    pub fn operation(&self) -> Option<&'a Operation> {
        match self {
            Self::Op(op) => Some(op),
            Self::Bound(bound) => bound.operation.as_operation(),
            Self::Switch(switch) => switch.next_operation.as_operation(),
        }
    }

    /// Whether the node has a target bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_) | Self::Switch(_))
    }

    /// The bound target: the destination target for switches.
    #[must_use]
    pub fn target(&self) -> Option<&'a Target> {
        match self {
            Self::Op(_) => None,
            Self::Bound(bound) => Some(&bound.target),
            Self::Switch(switch) => Some(&switch.target_target),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ParamIndex;
    use crate::predicate::Predicate;
    use crate::test_support::null_target as target;
    use crate::value::{DataKind, Value};

    fn read_op() -> Operation {
        Operation::read(ParamIndex::new(DataKind::new("User")))
    }

    #[test]
    fn test_flatten_law() {
        // ((a . b) . c) . d flattens to [a, b, c, d]
        let pipeline = read_op()
            .then(Operation::filter(Predicate::ge("age", 18)))
            .then(Operation::map(|v, _| v.clone()))
            .then(Operation::reduce(|acc, _| acc, 0));

        let nodes = pipeline.flatten();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].operation().unwrap().name(), "read");
        assert_eq!(nodes[1].operation().unwrap().name(), "filter");
        assert_eq!(nodes[2].operation().unwrap().name(), "map");
        assert_eq!(nodes[3].operation().unwrap().name(), "reduce");
    }

    #[test]
    fn test_flatten_mixed_nodes() {
        let sql = target("sql");
        let pipeline = read_op()
            .bound_to(&sql)
            .then(Operation::filter(Predicate::ge("age", 18)))
            .then(Operation::create_from_previous(DataKind::new("User")).bound_to(&sql));

        let nodes = pipeline.flatten();
        assert_eq!(nodes.len(), 3);
        assert!(nodes[0].is_bound());
        assert!(!nodes[1].is_bound());
        assert!(nodes[2].is_bound());
        assert_eq!(nodes[2].target().unwrap().name(), "sql");
    }

    #[test]
    fn test_nested_pipeline_flattens_in_order() {
        let head = read_op().then(Operation::filter(Predicate::ge("age", 18)));
        let tail = Operation::map(|v, _| v.clone()).then(Operation::reduce(|acc, _| acc, 0));
        let pipeline = head.then(tail);

        let names: Vec<_> = pipeline
            .flatten()
            .iter()
            .map(|n| n.operation().unwrap().name())
            .collect();
        assert_eq!(names, vec!["read", "filter", "map", "reduce"]);
    }

    #[test]
    fn test_same_target_composition_has_no_switch() {
        let sql = target("sql");
        let pipeline = read_op()
            .bound_to(&sql)
            .then(Operation::delete(ParamIndex::new(DataKind::new("User"))).bound_to(&sql));

        let nodes = pipeline.flatten();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(nodes[1], FlatNode::Bound(_)));
    }

    #[test]
    fn test_cross_target_composition_synthesizes_switch() {
        let sql = target("sql");
        let objects = target("objects");

        let pipeline = read_op()
            .bound_to(&sql)
            .then(Operation::create_from_previous(DataKind::new("User")).bound_to(&objects));

        let nodes = pipeline.flatten();
        assert_eq!(nodes.len(), 2);
        match nodes[1] {
            FlatNode::Switch(switch) => {
                assert_eq!(switch.source_target.name(), "sql");
                assert_eq!(switch.target_target.name(), "objects");
                assert_eq!(
                    switch.source_operation.as_operation().unwrap().name(),
                    "read"
                );
                assert_eq!(
                    switch.next_operation.as_operation().unwrap().name(),
                    "create"
                );
            }
            ref other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_target_identity_is_by_instance() {
        let a = target("same-name");
        let b = target("same-name");
        assert_eq!(a.name(), b.name());
        assert!(a == a.clone());
        assert!(a != b); // same name, different instance
    }

    #[test]
    fn test_rebinding_replaces_target() {
        let a = target("a");
        let b = target("b");

        let bound = read_op().bound_to(&a).bound_to(&b);
        assert_eq!(bound.target.name(), "b");
    }

    #[test]
    fn test_bound_pipeline_is_one_flat_node() {
        let sql = target("sql");
        let sub = read_op().then(Operation::filter(Predicate::ge("age", 18)));
        let pipeline = sub
            .bound_to(&sql)
            .then(Operation::transform(|items| Value::from(items.len() as i64)));

        let nodes = pipeline.flatten();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].operation().is_none()); // sub-pipeline, not a single op
        assert!(nodes[0].is_bound());
    }
}
