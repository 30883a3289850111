//! Storage Errors
//!
//! Explicit error types with context. Three families, per the engine's
//! error design: structural validation errors (raised before execution),
//! contract violations (programmer errors caught at execution time), and
//! backend errors (propagated unchanged, never translated or swallowed).

use thiserror::Error;

use crate::registry::RegistryError;
use crate::validator::ValidationError;

/// Errors from pipeline execution and storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Pipeline failed structural validation before execution
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Registry lookup or conversion failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An in-process operation ran without a previous result
    #[error("{operation} operation requires a previous result but none was provided")]
    MissingPreviousResult {
        /// Operation kind name
        operation: String,
    },

    /// A CRUD operation reached the executor without a target binding
    #[error("{operation} operation requires a target but is not bound to any")]
    UnboundOperation {
        /// Operation kind name
        operation: String,
    },

    /// The backend does not understand this index variant
    #[error("storage {storage} does not support {index} indexes")]
    UnsupportedIndex {
        /// Backend name
        storage: String,
        /// Index variant name
        index: String,
    },

    /// The backend cannot execute this operation kind
    #[error("storage {storage} does not support {operation} operations")]
    UnsupportedOperation {
        /// Backend name
        storage: String,
        /// Operation kind name
        operation: String,
    },

    /// No object at the given address
    #[error("no object at address {address}")]
    NotFound {
        /// Address that was looked up
        address: String,
    },

    /// A transaction of the wrong backend type was passed in
    #[error("storage {storage} received a foreign transaction")]
    ForeignTransaction {
        /// Backend name
        storage: String,
    },

    /// Connection error
    #[error("connection error: {message}")]
    Connection {
        /// Connection error detail
        message: String,
    },

    /// Query error
    #[error("query error: {message}")]
    Query {
        /// Query error detail
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Serialization error detail
        message: String,
    },

    /// Transaction error (begin/commit/rollback)
    #[error("transaction error: {message}")]
    Transaction {
        /// Transaction error detail
        message: String,
    },

    /// Injected fault (for deterministic failure testing)
    #[error("injected fault: {fault}")]
    Injected {
        /// Fault description
        fault: String,
    },

    /// Opaque backend error, propagated unchanged
    #[error("backend error: {message}")]
    Backend {
        /// Backend error detail
        message: String,
    },
}

impl StorageError {
    /// Create a missing-previous-result error.
    #[must_use]
    pub fn missing_previous(operation: impl Into<String>) -> Self {
        Self::MissingPreviousResult {
            operation: operation.into(),
        }
    }

    /// Create an unbound-operation error.
    #[must_use]
    pub fn unbound(operation: impl Into<String>) -> Self {
        Self::UnboundOperation {
            operation: operation.into(),
        }
    }

    /// Create an unsupported-index error.
    #[must_use]
    pub fn unsupported_index(storage: impl Into<String>, index: impl Into<String>) -> Self {
        Self::UnsupportedIndex {
            storage: storage.into(),
            index: index.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub fn unsupported_operation(storage: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            storage: storage.into(),
            operation: operation.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(address: impl Into<String>) -> Self {
        Self::NotFound {
            address: address.into(),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an injected-fault error.
    #[must_use]
    pub fn injected(fault: impl Into<String>) -> Self {
        Self::Injected {
            fault: fault.into(),
        }
    }

    /// Create an opaque backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether this is a contract violation (programmer error, not
    /// recoverable by retrying).
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingPreviousResult { .. }
                | Self::UnboundOperation { .. }
                | Self::UnsupportedIndex { .. }
                | Self::UnsupportedOperation { .. }
                | Self::ForeignTransaction { .. }
        )
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = StorageError::unsupported_index("objects", "vector");
        assert!(matches!(err, StorageError::UnsupportedIndex { .. }));
        assert_eq!(
            err.to_string(),
            "storage objects does not support vector indexes"
        );

        let err = StorageError::missing_previous("filter");
        assert!(err.is_contract_violation());

        let err = StorageError::connection("refused");
        assert!(!err.is_contract_violation());
    }
}
