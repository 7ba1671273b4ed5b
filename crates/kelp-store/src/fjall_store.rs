//! Fjall-backed object storage.

use std::path::Path;

use bytes::Bytes;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use kelp_types::ObjectId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ObjectStore;

fn storage_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Durable object store backed by a fjall keyspace.
pub struct FjallObjectStore {
    #[allow(dead_code)]
    db: Database,
    objects: Keyspace,
}

impl FjallObjectStore {
    /// Open a persistent store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        Self::init(db)
    }

    /// Open a temporary store, cleaned up when the store is dropped.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let dir = tempfile::tempdir().map_err(storage_err)?.keep();
        let db = Database::builder(dir)
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        let objects = db
            .keyspace("objects", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        Ok(Self { db, objects })
    }
}

#[async_trait::async_trait]
impl ObjectStore for FjallObjectStore {
    async fn put(&self, data: Bytes) -> Result<ObjectId, StoreError> {
        let id = ObjectId::from_data(&data);
        self.objects
            .insert(id.as_bytes(), data.as_ref())
            .map_err(storage_err)?;
        debug!(%id, "stored object on disk");
        Ok(id)
    }

    async fn get(&self, id: ObjectId) -> Result<Option<Bytes>, StoreError> {
        let value = self.objects.get(id.as_bytes()).map_err(storage_err)?;
        Ok(value.map(|v| Bytes::from(v.to_vec())))
    }

    async fn has(&self, id: ObjectId) -> Result<bool, StoreError> {
        Ok(self.objects.get(id.as_bytes()).map_err(storage_err)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip_on_disk() {
        let store = FjallObjectStore::open_temporary().unwrap();
        let data = Bytes::from_static(b"durable bytes");

        let id = store.put(data.clone()).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(data));
        assert!(store.has(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_on_disk() {
        let store = FjallObjectStore::open_temporary().unwrap();
        let id = ObjectId::from_data(b"ghost");
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reopen_preserves_objects() {
        let dir = tempfile::tempdir().unwrap();
        let data = Bytes::from_static(b"survives reopen");

        let id = {
            let store = FjallObjectStore::open(dir.path()).unwrap();
            store.put(data.clone()).await.unwrap()
        };

        let store = FjallObjectStore::open(dir.path()).unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(data));
    }
}
