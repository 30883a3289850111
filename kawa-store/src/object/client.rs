//! Object Client Contract
//!
//! Thin boundary over a cloud object-storage SDK. The engine only ever
//! talks to this trait; real S3/GCS bindings live outside the core and
//! implement it. An in-memory client is provided for tests and embedded
//! use.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kawa_core::error::{StorageError, StoreResult};

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// MIME type the object was stored with
    pub content_type: String,
    /// Object size in bytes
    pub size_bytes: u64,
    /// When the object was stored
    pub stored_at: DateTime<Utc>,
}

/// Minimal object-store client: byte blobs at string paths.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Store bytes at a path, overwriting any existing object.
    ///
    /// # Errors
    /// Client/transport failures.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()>;

    /// Fetch the bytes at a path.
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when nothing is stored there.
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Delete the object at a path. Returns whether it existed.
    ///
    /// # Errors
    /// Client/transport failures.
    async fn delete(&self, path: &str) -> StoreResult<bool>;

    /// List paths under a prefix, sorted.
    ///
    /// # Errors
    /// Client/transport failures.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Metadata of the object at a path, `None` when absent.
    ///
    /// # Errors
    /// Client/transport failures.
    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>>;
}

// =============================================================================
// MemoryObjectClient
// =============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    meta: ObjectMeta,
}

/// In-memory object client.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectClient {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectClient {
    /// Create an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.read().expect("object lock poisoned").len()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            stored_at: Utc::now(),
        };
        self.objects
            .write()
            .expect("object lock poisoned")
            .insert(path.to_string(), StoredObject { bytes, meta });
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .expect("object lock poisoned")
            .get(path)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn delete(&self, path: &str) -> StoreResult<bool> {
        Ok(self
            .objects
            .write()
            .expect("object lock poisoned")
            .remove(path)
            .is_some())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .expect("object lock poisoned")
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>> {
        Ok(self
            .objects
            .read()
            .expect("object lock poisoned")
            .get(path)
            .map(|object| object.meta.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let client = MemoryObjectClient::new();
        client
            .put("docs/a.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert_eq!(client.get("docs/a.json").await.unwrap(), b"{}".to_vec());

        let meta = client.head("docs/a.json").await.unwrap().unwrap();
        assert_eq!(meta.content_type, "application/json");
        assert_eq!(meta.size_bytes, 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let client = MemoryObjectClient::new();
        let err = client.get("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let client = MemoryObjectClient::new();
        for path in ["a/1.json", "a/2.json", "b/1.json"] {
            client
                .put(path, b"{}".to_vec(), "application/json")
                .await
                .unwrap();
        }

        assert_eq!(client.list("a/").await.unwrap().len(), 2);
        assert_eq!(client.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let client = MemoryObjectClient::new();
        client
            .put("a.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert!(client.delete("a.json").await.unwrap());
        assert!(!client.delete("a.json").await.unwrap());
    }
}
