//! Operation Algebra
//!
//! Eight immutable operation kinds describing *what* to do, never *how*.
//! Operations hold no shared state and never execute themselves; targets
//! do. Create/Read/Update/Delete require a target; Filter/Map/Reduce/
//! Transform consume the previous result and always run in-process.

use std::fmt;
use std::sync::Arc;

use crate::index::SearchIndex;
use crate::patch::Patch;
use crate::predicate::Predicate;
use crate::value::{DataKind, Value};

// =============================================================================
// Function aliases
// =============================================================================

/// Per-item mapping function `(item, position) -> item`.
pub type MapFn = Arc<dyn Fn(&Value, usize) -> Value + Send + Sync>;

/// Fold function `(accumulator, item) -> accumulator`.
pub type ReduceFn = Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>;

/// Whole-collection transform `items -> value`.
pub type TransformFn = Arc<dyn Fn(Vec<Value>) -> Value + Send + Sync>;

/// Late-bound create literal, invoked with the previous result.
pub type LiteralFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

// =============================================================================
// Create literals
// =============================================================================

/// One item of a create payload.
#[derive(Clone)]
pub enum Literal {
    /// Plain value stored as-is
    Value(Value),
    /// Function of the previous result, resolved just before the create runs
    FromResult(LiteralFn),
}

impl Literal {
    /// Plain literal.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Late-bound literal.
    #[must_use]
    pub fn from_result(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self::FromResult(Arc::new(f))
    }
}

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::FromResult(_) => write!(f, "FromResult(<fn>)"),
        }
    }
}

// =============================================================================
// Concrete operations
// =============================================================================

/// Store items in a target.
#[derive(Debug, Clone)]
pub struct CreateOperation {
    /// Kind of the items being created
    pub kind: DataKind,
    /// Explicit payload; may be empty when the data comes from the
    /// previous result
    pub data: Vec<Literal>,
}

/// Read items located by a search index.
#[derive(Debug, Clone)]
pub struct ReadOperation {
    /// Where to look
    pub index: SearchIndex,
}

/// Update items located by a search index.
#[derive(Debug, Clone)]
pub struct UpdateOperation {
    /// Which items to update
    pub index: SearchIndex,
    /// What to change
    pub patch: Patch,
}

/// Delete items located by a search index.
#[derive(Debug, Clone)]
pub struct DeleteOperation {
    /// Which items to delete
    pub index: SearchIndex,
}

/// Keep items matching a predicate.
#[derive(Debug, Clone)]
pub struct FilterOperation {
    /// Keep items for which this is true
    pub predicate: Predicate,
}

/// Apply a function to each item.
#[derive(Clone)]
pub struct MapOperation {
    /// `(item, position) -> item`
    pub mapper: MapFn,
}

/// Fold items into a single value.
#[derive(Clone)]
pub struct ReduceOperation {
    /// `(accumulator, item) -> accumulator`
    pub reducer: ReduceFn,
    /// Starting accumulator
    pub initial: Value,
}

/// Transform the whole collection at once.
#[derive(Clone)]
pub struct TransformOperation {
    /// `items -> value`
    pub transform: TransformFn,
}

impl fmt::Debug for MapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapOperation(<fn>)")
    }
}

impl fmt::Debug for ReduceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceOperation")
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for TransformOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformOperation(<fn>)")
    }
}

// =============================================================================
// Operation
// =============================================================================

/// An immutable description of one data action.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Store items
    Create(CreateOperation),
    /// Read items by index
    Read(ReadOperation),
    /// Update items by index
    Update(UpdateOperation),
    /// Delete items by index
    Delete(DeleteOperation),
    /// Keep matching items
    Filter(FilterOperation),
    /// Per-item mapping
    Map(MapOperation),
    /// Fold into one value
    Reduce(ReduceOperation),
    /// Whole-collection transform
    Transform(TransformOperation),
}

impl Operation {
    /// Create operation with plain values.
    #[must_use]
    pub fn create(kind: DataKind, data: impl IntoIterator<Item = Value>) -> Self {
        Self::Create(CreateOperation {
            kind,
            data: data.into_iter().map(Literal::Value).collect(),
        })
    }

    /// Create operation with late-bound literals.
    #[must_use]
    pub fn create_with(kind: DataKind, data: impl IntoIterator<Item = Literal>) -> Self {
        Self::Create(CreateOperation {
            kind,
            data: data.into_iter().collect(),
        })
    }

    /// Create operation whose data comes entirely from the previous result.
    #[must_use]
    pub fn create_from_previous(kind: DataKind) -> Self {
        Self::Create(CreateOperation {
            kind,
            data: Vec::new(),
        })
    }

    /// Read operation.
    #[must_use]
    pub fn read(index: impl Into<SearchIndex>) -> Self {
        Self::Read(ReadOperation {
            index: index.into(),
        })
    }

    /// Update operation.
    #[must_use]
    pub fn update(index: impl Into<SearchIndex>, patch: Patch) -> Self {
        Self::Update(UpdateOperation {
            index: index.into(),
            patch,
        })
    }

    /// Delete operation.
    #[must_use]
    pub fn delete(index: impl Into<SearchIndex>) -> Self {
        Self::Delete(DeleteOperation {
            index: index.into(),
        })
    }

    /// Filter operation.
    #[must_use]
    pub fn filter(predicate: Predicate) -> Self {
        Self::Filter(FilterOperation { predicate })
    }

    /// Map operation.
    #[must_use]
    pub fn map(mapper: impl Fn(&Value, usize) -> Value + Send + Sync + 'static) -> Self {
        Self::Map(MapOperation {
            mapper: Arc::new(mapper),
        })
    }

    /// Reduce operation.
    #[must_use]
    pub fn reduce(
        reducer: impl Fn(Value, &Value) -> Value + Send + Sync + 'static,
        initial: impl Into<Value>,
    ) -> Self {
        Self::Reduce(ReduceOperation {
            reducer: Arc::new(reducer),
            initial: initial.into(),
        })
    }

    /// Transform operation.
    #[must_use]
    pub fn transform(transform: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static) -> Self {
        Self::Transform(TransformOperation {
            transform: Arc::new(transform),
        })
    }

    /// Whether this operation consumes the previous result.
    ///
    /// True for Filter/Map/Reduce/Transform; these always execute
    /// in-process and must never be target-bound.
    #[must_use]
    pub fn needs_previous_result(&self) -> bool {
        matches!(
            self,
            Self::Filter(_) | Self::Map(_) | Self::Reduce(_) | Self::Transform(_)
        )
    }

    /// Whether this operation requires a target binding.
    ///
    /// True for Create/Read/Update/Delete. Create is exempted by the
    /// validator when it can source its data from the previous result.
    #[must_use]
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Read(_) | Self::Update(_) | Self::Delete(_)
        )
    }

    /// Operation kind name, for errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Read(_) => "read",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Filter(_) => "filter",
            Self::Map(_) => "map",
            Self::Reduce(_) => "reduce",
            Self::Transform(_) => "transform",
        }
    }

    /// The search index of a CRUD operation, if it carries one.
    #[must_use]
    pub fn index(&self) -> Option<&SearchIndex> {
        match self {
            Self::Read(op) => Some(&op.index),
            Self::Update(op) => Some(&op.index),
            Self::Delete(op) => Some(&op.index),
            _ => None,
        }
    }
}
