//! Path-Based Index
//!
//! Single backend-native address, for object stores and filesystems.

use crate::constants::PATH_INDEX_ADDRESS_BYTES_MAX;
use crate::value::DataKind;

/// Index addressing one object by path.
///
/// # Example
///
/// ```
/// use kawa_core::index::PathIndex;
/// use kawa_core::value::DataKind;
///
/// let index = PathIndex::new(DataKind::new("Document"), "reports/2024/q3.json");
/// assert_eq!(index.path(), "reports/2024/q3.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathIndex {
    kind: DataKind,
    path: String,
}

impl PathIndex {
    /// Create a path index.
    ///
    /// # Panics
    /// Panics if the path is empty or exceeds the length limit.
    #[must_use]
    pub fn new(kind: DataKind, path: impl Into<String>) -> Self {
        let path = path.into();
        // Preconditions
        assert!(!path.is_empty(), "path cannot be empty");
        assert!(
            path.len() <= PATH_INDEX_ADDRESS_BYTES_MAX,
            "path {} bytes exceeds max {}",
            path.len(),
            PATH_INDEX_ADDRESS_BYTES_MAX
        );
        Self { kind, path }
    }

    /// Data kind this index searches for.
    #[must_use]
    pub fn data_kind(&self) -> &DataKind {
        &self.kind
    }

    /// Backend-native address.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_index() {
        let index = PathIndex::new(DataKind::new("Document"), "docs/readme.json");
        assert_eq!(index.data_kind().as_str(), "Document");
        assert_eq!(index.path(), "docs/readme.json");
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn test_empty_path_rejected() {
        let _ = PathIndex::new(DataKind::new("Document"), "");
    }
}
