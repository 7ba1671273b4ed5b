//! In-memory object storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use kelp_types::ObjectId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ObjectStore;

/// In-memory object store backed by a `RwLock<HashMap>`.
///
/// Volatile — contents live exactly as long as the store. Useful for tests
/// and for nodes configured to run without durable storage.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Bytes>>,
}

impl MemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, data: Bytes) -> Result<ObjectId, StoreError> {
        let id = ObjectId::from_data(&data);
        let mut map = self.objects.write().expect("lock poisoned");

        if map.insert(id, data).is_none() {
            debug!(%id, "stored object in memory");
        }

        Ok(id)
    }

    async fn get(&self, id: ObjectId) -> Result<Option<Bytes>, StoreError> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(&id).cloned())
    }

    async fn has(&self, id: ObjectId) -> Result<bool, StoreError> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from_static(b"hello object");

        let id = store.put(data.clone()).await.unwrap();
        assert_eq!(id, ObjectId::from_data(b"hello object"));
        assert_eq!(store.get(id).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryObjectStore::new();
        let id = ObjectId::from_data(b"never stored");
        assert_eq!(store.get(id).await.unwrap(), None);
        assert!(!store.has(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from_static(b"same bytes");

        let id1 = store.put(data.clone()).await.unwrap();
        let id2 = store.put(data).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts() {
        let store = std::sync::Arc::new(MemoryObjectStore::new());
        let mut handles = Vec::new();

        for i in 0..50u8 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let data = Bytes::from(vec![i; 64]);
                let id = s.put(data.clone()).await.unwrap();
                assert_eq!(s.get(id).await.unwrap(), Some(data));
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len(), 50);
    }
}
