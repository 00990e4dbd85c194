//! Object store seam
//!
//! Report snapshots are blobs handed to an external object store, answered
//! with a retrievable, time-limited reference. The in-memory implementation
//! serves testing and single-process deployment.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store failure: {0}")]
    Storage(String),
}

/// Blob store with time-limited retrieval references.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob under `key`.
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// A reference to a stored blob that expires after `ttl`.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
    stored_at: DateTime<Utc>,
}

/// In-memory implementation of [`ObjectStore`].
pub struct InMemoryObjectStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a stored blob (test/diagnostic helper).
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map(|o| (o.body.clone(), o.content_type.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                    stored_at: Utc::now(),
                },
            );
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        let objects = self
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let object = objects
            .get(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;

        let expires_at = object.stored_at
            + chrono::Duration::seconds(ttl.as_secs().min(i64::MAX as u64) as i64);
        Ok(format!(
            "{}/{}?expires={}",
            self.base_url,
            key,
            expires_at.timestamp()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_presign() {
        let store = InMemoryObjectStore::new("memory://reports");
        store
            .put("reports/json/test.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let url = store
            .presign("reports/json/test.json", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("memory://reports/reports/json/test.json?expires="));

        let (body, content_type) = store.get("reports/json/test.json").unwrap();
        assert_eq!(body, b"{}");
        assert_eq!(content_type, "application/json");
    }

    #[tokio::test]
    async fn test_presign_unknown_key() {
        let store = InMemoryObjectStore::default();
        let result = store.presign("missing", Duration::from_secs(60)).await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
    }
}
