//! Database manifests.

use bytes::Bytes;
use kelp_store::ObjectStore;
use kelp_types::{ObjectId, StoreKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DbError;

/// Immutable database descriptor.
///
/// The manifest is persisted to the object store; its content address is
/// the database's root identity and the first segment of its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The database name.
    pub name: String,
    /// The database flavor.
    pub kind: StoreKind,
    /// Content address of the persisted access controller.
    pub access: ObjectId,
}

impl Manifest {
    /// Build a manifest.
    pub fn new(name: impl Into<String>, kind: StoreKind, access: ObjectId) -> Self {
        Self {
            name: name.into(),
            kind,
            access,
        }
    }

    /// Persist the canonical encoding and return the root identity.
    pub async fn save(&self, objects: &dyn ObjectStore) -> Result<ObjectId, DbError> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        let root = objects.put(Bytes::from(bytes)).await?;
        debug!(name = %self.name, kind = %self.kind, root = %root, "persisted manifest");
        Ok(root)
    }

    /// Fetch and decode a manifest by root identity.
    pub async fn load(objects: &dyn ObjectStore, root: ObjectId) -> Result<Self, DbError> {
        let bytes = objects
            .get(root)
            .await?
            .ok_or_else(|| DbError::NotFound(root.to_string()))?;
        let manifest = postcard::from_bytes(&bytes)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(manifest)
    }
}
