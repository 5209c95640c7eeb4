//! Object store abstraction.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StorageError, StorageResult};

/// Blob storage used by the pipeline for temporary sources and published shorts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Delete `key`. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Publicly reachable URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Verify the backend is reachable.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// In-process store. Used for local development without object storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    base_url: String,
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.get_with_type(key).map(|(data, _)| data)
    }

    /// Stored bytes together with their content type.
    pub fn get_with_type(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new("http://localhost/storage/");
        store
            .put("shorts/a.mp4", Bytes::from_static(b"clip"), "video/mp4")
            .await
            .unwrap();

        assert_eq!(store.get("shorts/a.mp4").unwrap(), Bytes::from_static(b"clip"));
        assert_eq!(
            store.public_url("shorts/a.mp4"),
            "http://localhost/storage/shorts/a.mp4"
        );

        store.delete("shorts/a.mp4").await.unwrap();
        store.delete("shorts/a.mp4").await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_empty_key() {
        let store = MemoryStore::new("http://localhost");
        assert!(matches!(
            store.put("", Bytes::new(), "video/mp4").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
