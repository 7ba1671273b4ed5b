//! Latest-write-wins key/value store.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use kelp_oplog::TraverseOptions;
use kelp_types::{ObjectId, StoreKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::check_kind;
use crate::error::DbError;
use crate::store::Store;

/// Key/value operations carried in entry payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum KvOp {
    /// Set a key.
    Put { key: String, value: Vec<u8> },
    /// Remove a key.
    Del { key: String },
}

/// Per key, the operation of the entry with the greatest
/// `(clock.time, clock.id, hash)` wins; a winning `Del` hides the key.
pub struct KeyValue {
    store: Arc<Store>,
}

impl KeyValue {
    /// Wrap a keyvalue-flavored store.
    pub fn new(store: Arc<Store>) -> Result<Self, DbError> {
        check_kind(&store, StoreKind::KeyValue)?;
        Ok(Self { store })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn append_op(&self, op: &KvOp) -> Result<ObjectId, DbError> {
        let bytes = postcard::to_allocvec(op)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(self.store.append(Bytes::from(bytes)).await?.hash)
    }

    /// Set a key; returns the new entry's hash.
    pub async fn put(
        &self,
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Result<ObjectId, DbError> {
        self.append_op(&KvOp::Put {
            key: key.into(),
            value: value.into().to_vec(),
        })
        .await
    }

    /// Remove a key; returns the new entry's hash.
    pub async fn del(&self, key: impl Into<String>) -> Result<ObjectId, DbError> {
        self.append_op(&KvOp::Del { key: key.into() }).await
    }

    /// The current value of a key, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, DbError> {
        Ok(self.all().await?.remove(key))
    }

    /// Materialize the full map.
    ///
    /// The traversal is already linearized oldest-first, so folding the
    /// operations in order leaves the latest write per key.
    pub async fn all(&self) -> Result<BTreeMap<String, Bytes>, DbError> {
        let entries = self.store.traverse(&TraverseOptions::default()).await?;
        let mut map: BTreeMap<String, Option<Bytes>> = BTreeMap::new();

        for entry in entries {
            match postcard::from_bytes::<KvOp>(&entry.payload) {
                Ok(KvOp::Put { key, value }) => {
                    map.insert(key, Some(Bytes::from(value)));
                }
                Ok(KvOp::Del { key }) => {
                    map.insert(key, None);
                }
                Err(e) => {
                    warn!(hash = %entry.hash, "skipping undecodable key/value entry: {e}");
                }
            }
        }

        Ok(map
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}
