//! Pipeline Validator
//!
//! Static structural check of a composed pipeline, run before any
//! execution. Catches misuse early so a broken pipeline never partially
//! executes. Pure and side-effect free.
//!
//! Every failure carries the 0-based index of the offending node in the
//! flattened pipeline.

use thiserror::Error;

use crate::operation::Operation;
use crate::pipeline::Pipeline;

/// Why a pipeline node failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    /// An in-process operation opens the pipeline with nothing to consume
    #[error("{operation} requires a previous result but is the first operation")]
    FirstRequiresPreviousResult {
        /// Operation kind name
        operation: String,
    },

    /// Filter/Map/Reduce/Transform execute in-process and must stay unbound
    #[error("{operation} executes in-process and must not be target-bound")]
    BoundInProcessOperation {
        /// Operation kind name
        operation: String,
    },

    /// A CRUD operation has no target and no exemption applies
    #[error("{operation} requires a target binding but is not bound to any")]
    UnboundOperation {
        /// Operation kind name
        operation: String,
    },

    /// An unbound create has neither explicit data nor a previous result
    #[error("create has no data and receives no previous result")]
    CreateWithoutInput,
}

/// Pipeline validation failure at a specific position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pipeline at operation {index}: {kind}")]
pub struct ValidationError {
    /// 0-based index of the offending node in the flattened pipeline
    pub index: usize,
    /// What is wrong with it
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    fn new(index: usize, kind: ValidationErrorKind) -> Self {
        Self { index, kind }
    }
}

/// Validate a composed pipeline.
///
/// Flattens the tree and checks each node:
///
/// 1. Filter/Map/Reduce/Transform must not open the pipeline and must not
///    be target-bound.
/// 2. Create/Read/Update/Delete must be target-bound. Create alone is
///    exempt when it will receive a previous result (any position after
///    the first) or carries explicit non-empty data.
///
/// Bound sub-pipelines are validated as opaque units here; their inner
/// structure is checked by the backend that executes them.
///
/// # Errors
/// [`ValidationError`] carrying the offending node's 0-based index.
pub fn validate(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let nodes = pipeline.flatten();

    for (index, node) in nodes.iter().enumerate() {
        let Some(operation) = node.operation() else {
            // Bound sub-pipeline: opaque at this level.
            continue;
        };
        let bound = node.is_bound();

        if operation.needs_previous_result() {
            if index == 0 {
                return Err(ValidationError::new(
                    index,
                    ValidationErrorKind::FirstRequiresPreviousResult {
                        operation: operation.name().to_string(),
                    },
                ));
            }
            if bound {
                return Err(ValidationError::new(
                    index,
                    ValidationErrorKind::BoundInProcessOperation {
                        operation: operation.name().to_string(),
                    },
                ));
            }
        }

        if operation.needs_target() && !bound {
            match operation {
                Operation::Create(create) => {
                    let receives_previous = index > 0;
                    if !receives_previous && create.data.is_empty() {
                        return Err(ValidationError::new(
                            index,
                            ValidationErrorKind::CreateWithoutInput,
                        ));
                    }
                }
                _ => {
                    return Err(ValidationError::new(
                        index,
                        ValidationErrorKind::UnboundOperation {
                            operation: operation.name().to_string(),
                        },
                    ));
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
