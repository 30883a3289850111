//! Data Type Registry
//!
//! Bidirectional mapping between domain kinds and backend-native kinds,
//! plus named, reusable index factories.
//!
//! The registry is process-wide: built once at startup, shared read-only
//! (behind an `Arc`) during request handling. Converters are pure, total
//! functions over one value.
//!
//! # Example
//!
//! ```
//! use kawa_core::registry::DataTypeRegistry;
//! use kawa_core::value::{DataKind, Value};
//!
//! let mut registry = DataTypeRegistry::new();
//! registry.register(
//!     DataKind::new("user_rows"),
//!     DataKind::new("User"),
//!     |value| Ok(value),
//!     |value| Ok(value),
//! );
//!
//! let registration = registry
//!     .get_for_user_kind(&DataKind::new("User"), None)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(registration.storage_kind.as_str(), "user_rows");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::constants::INDEX_NAME_BYTES_MAX;
use crate::index::SearchIndex;
use crate::value::{DataKind, Value};

// =============================================================================
// Errors
// =============================================================================

/// Errors from registry lookups and registration.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Multiple storage mappings exist for a user kind and no disambiguator was given
    #[error("multiple mappings for user kind {user}: specify one of [{}]", candidates.join(", "))]
    AmbiguousUserKind {
        /// User kind that was looked up
        user: String,
        /// Candidate storage kinds
        candidates: Vec<String>,
    },

    /// Multiple user mappings exist for a storage kind and no disambiguator was given
    #[error("multiple mappings for storage kind {storage}: specify one of [{}]", candidates.join(", "))]
    AmbiguousStorageKind {
        /// Storage kind that was looked up
        storage: String,
        /// Candidate user kinds
        candidates: Vec<String>,
    },

    /// A disambiguator was given but no registration matches it
    #[error("no mapping found for {from} -> {to}")]
    NoMapping {
        /// Kind that was looked up
        from: String,
        /// Requested counterpart kind
        to: String,
    },

    /// An index with this name is already registered for the kind
    #[error("index {name:?} for {kind} is already registered")]
    DuplicateIndex {
        /// Data kind of the index
        kind: String,
        /// Conflicting index name
        name: String,
    },

    /// A converter rejected a value
    #[error("conversion error: {message}")]
    Conversion {
        /// Conversion failure detail
        message: String,
    },
}

impl RegistryError {
    /// Create a conversion error.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// Registration
// =============================================================================

/// Value converter between user and storage representations.
pub type Converter = Arc<dyn Fn(Value) -> RegistryResult<Value> + Send + Sync>;

/// Factory producing a reusable search index from call parameters.
pub type IndexFactory = Arc<dyn Fn(&[Value]) -> SearchIndex + Send + Sync>;

/// One bidirectional converter pair.
#[derive(Clone)]
pub struct TypeRegistration {
    /// Backend-native kind (e.g. a table name)
    pub storage_kind: DataKind,
    /// Domain kind
    pub user_kind: DataKind,
    /// Domain -> storage conversion
    pub to_storage: Converter,
    /// Storage -> domain conversion
    pub from_storage: Converter,
}

impl TypeRegistration {
    /// Convert a user value to its storage representation.
    ///
    /// # Errors
    /// Returns the converter's error unchanged.
    pub fn to_storage(&self, value: Value) -> RegistryResult<Value> {
        (self.to_storage)(value)
    }

    /// Convert a storage value to its user representation.
    ///
    /// # Errors
    /// Returns the converter's error unchanged.
    pub fn from_storage(&self, value: Value) -> RegistryResult<Value> {
        (self.from_storage)(value)
    }
}

impl fmt::Debug for TypeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistration")
            .field("storage_kind", &self.storage_kind)
            .field("user_kind", &self.user_kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DataTypeRegistry
// =============================================================================

/// Registry of data kind mappings and named index factories.
#[derive(Default)]
pub struct DataTypeRegistry {
    user_to_storage: BTreeMap<DataKind, Vec<TypeRegistration>>,
    storage_to_user: BTreeMap<DataKind, Vec<TypeRegistration>>,
    indexes: BTreeMap<DataKind, BTreeMap<String, IndexFactory>>,
}

impl DataTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind mapping. Multiple mappings per user kind or per
    /// storage kind are allowed; lookups disambiguate.
    pub fn register(
        &mut self,
        storage_kind: DataKind,
        user_kind: DataKind,
        to_storage: impl Fn(Value) -> RegistryResult<Value> + Send + Sync + 'static,
        from_storage: impl Fn(Value) -> RegistryResult<Value> + Send + Sync + 'static,
    ) {
        let registration = TypeRegistration {
            storage_kind: storage_kind.clone(),
            user_kind: user_kind.clone(),
            to_storage: Arc::new(to_storage),
            from_storage: Arc::new(from_storage),
        };
        self.user_to_storage
            .entry(user_kind)
            .or_default()
            .push(registration.clone());
        self.storage_to_user
            .entry(storage_kind)
            .or_default()
            .push(registration);
    }

    /// Register a mapping whose converters pass values through unchanged.
    ///
    /// Useful when the storage representation is the record itself and
    /// only the kind name differs (e.g. "User" stored in table "users").
    pub fn register_identity(&mut self, storage_kind: DataKind, user_kind: DataKind) {
        self.register(storage_kind, user_kind, Ok, Ok);
    }

    /// Look up the registration for a user kind.
    ///
    /// With `storage` given, returns the exact (user, storage) match.
    /// Without it, the registration must be unique.
    ///
    /// # Errors
    /// [`RegistryError::AmbiguousUserKind`] when several registrations
    /// exist and no disambiguator was given;
    /// [`RegistryError::NoMapping`] when the disambiguator matches none.
    pub fn get_for_user_kind(
        &self,
        user: &DataKind,
        storage: Option<&DataKind>,
    ) -> RegistryResult<Option<&TypeRegistration>> {
        let Some(registrations) = self.user_to_storage.get(user) else {
            return Ok(None);
        };
        if registrations.is_empty() {
            return Ok(None);
        }

        if let Some(storage) = storage {
            return registrations
                .iter()
                .find(|r| &r.storage_kind == storage)
                .map(Some)
                .ok_or_else(|| RegistryError::NoMapping {
                    from: user.to_string(),
                    to: storage.to_string(),
                });
        }

        if registrations.len() > 1 {
            return Err(RegistryError::AmbiguousUserKind {
                user: user.to_string(),
                candidates: registrations
                    .iter()
                    .map(|r| r.storage_kind.to_string())
                    .collect(),
            });
        }

        Ok(registrations.first())
    }

    /// Look up the registration for a storage kind. Symmetric to
    /// [`get_for_user_kind`](Self::get_for_user_kind).
    ///
    /// # Errors
    /// [`RegistryError::AmbiguousStorageKind`] when several registrations
    /// exist and no disambiguator was given;
    /// [`RegistryError::NoMapping`] when the disambiguator matches none.
    pub fn get_for_storage_kind(
        &self,
        storage: &DataKind,
        user: Option<&DataKind>,
    ) -> RegistryResult<Option<&TypeRegistration>> {
        let Some(registrations) = self.storage_to_user.get(storage) else {
            return Ok(None);
        };
        if registrations.is_empty() {
            return Ok(None);
        }

        if let Some(user) = user {
            return registrations
                .iter()
                .find(|r| &r.user_kind == user)
                .map(Some)
                .ok_or_else(|| RegistryError::NoMapping {
                    from: storage.to_string(),
                    to: user.to_string(),
                });
        }

        if registrations.len() > 1 {
            return Err(RegistryError::AmbiguousStorageKind {
                storage: storage.to_string(),
                candidates: registrations
                    .iter()
                    .map(|r| r.user_kind.to_string())
                    .collect(),
            });
        }

        Ok(registrations.first())
    }

    /// Register a named index factory for a data kind.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateIndex`] when the name is taken for the kind.
    ///
    /// # Panics
    /// Panics if the index name is empty or exceeds the length limit.
    pub fn register_index(
        &mut self,
        kind: DataKind,
        name: impl Into<String>,
        factory: impl Fn(&[Value]) -> SearchIndex + Send + Sync + 'static,
    ) -> RegistryResult<()> {
        let name = name.into();
        // Preconditions
        assert!(!name.is_empty(), "index name cannot be empty");
        assert!(
            name.len() <= INDEX_NAME_BYTES_MAX,
            "index name {} bytes exceeds max {}",
            name.len(),
            INDEX_NAME_BYTES_MAX
        );

        let factories = self.indexes.entry(kind.clone()).or_default();
        if factories.contains_key(&name) {
            return Err(RegistryError::DuplicateIndex {
                kind: kind.to_string(),
                name,
            });
        }
        factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Get a registered index factory.
    #[must_use]
    pub fn get_index(&self, kind: &DataKind, name: &str) -> Option<IndexFactory> {
        self.indexes.get(kind)?.get(name).cloned()
    }

    /// List registered index names for a kind, sorted.
    #[must_use]
    pub fn list_indexes(&self, kind: &DataKind) -> Vec<String> {
        self.indexes
            .get(kind)
            .map(|factories| factories.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for DataTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTypeRegistry")
            .field("user_kinds", &self.user_to_storage.len())
            .field("storage_kinds", &self.storage_to_user.len())
            .field("index_kinds", &self.indexes.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
