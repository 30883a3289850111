//! Engine Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `PIPELINE_OPERATIONS_COUNT_MAX` (not `MAX_PIPELINE_OPERATIONS`)
//!
//! Every constant includes units in the name:
//! - _`BYTES_MAX` for size limits
//! - _`COUNT_MAX` for quantity limits

// =============================================================================
// Pipeline Limits
// =============================================================================

/// Maximum number of operations in a flattened pipeline
pub const PIPELINE_OPERATIONS_COUNT_MAX: usize = 1024;

// =============================================================================
// Index Limits
// =============================================================================

/// Maximum number of parameters in a parameter index
pub const PARAM_INDEX_FIELDS_COUNT_MAX: usize = 64;

/// Maximum length of a path-index address
pub const PATH_INDEX_ADDRESS_BYTES_MAX: usize = 1024;

/// Default result limit for vector similarity indexes
pub const VECTOR_INDEX_LIMIT_DEFAULT: usize = 10;

/// Default similarity threshold for vector indexes
pub const VECTOR_INDEX_THRESHOLD_DEFAULT: f64 = 0.7;

// =============================================================================
// Registry Limits
// =============================================================================

/// Maximum length of a data kind name
pub const DATA_KIND_NAME_BYTES_MAX: usize = 256;

/// Maximum length of a registered index name
pub const INDEX_NAME_BYTES_MAX: usize = 256;
