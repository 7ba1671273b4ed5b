//! Feed: an event log whose entries can be tombstoned.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use kelp_oplog::TraverseOptions;
use kelp_types::{ObjectId, StoreKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{LogRecord, check_kind};
use crate::error::DbError;
use crate::store::Store;

/// Feed operations carried in entry payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum FeedOp {
    /// Publish a payload.
    Add(Vec<u8>),
    /// Tombstone a previously added entry by hash.
    Remove(ObjectId),
}

/// An event log with deletion: tombstone entries reference a prior entry
/// hash, and the projection hides both the tombstone and its target.
pub struct Feed {
    store: Arc<Store>,
}

impl Feed {
    /// Wrap a feed-flavored store.
    pub fn new(store: Arc<Store>) -> Result<Self, DbError> {
        check_kind(&store, StoreKind::Feed)?;
        Ok(Self { store })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Append a payload; returns the new entry's hash.
    pub async fn add(&self, payload: impl Into<Bytes>) -> Result<ObjectId, DbError> {
        let op = FeedOp::Add(payload.into().to_vec());
        let bytes = postcard::to_allocvec(&op)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(self.store.append(Bytes::from(bytes)).await?.hash)
    }

    /// Tombstone a previously added entry; returns the tombstone's hash.
    pub async fn remove(&self, hash: ObjectId) -> Result<ObjectId, DbError> {
        let op = FeedOp::Remove(hash);
        let bytes = postcard::to_allocvec(&op)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(self.store.append(Bytes::from(bytes)).await?.hash)
    }

    /// Enumerate live records: additions that no tombstone references.
    pub async fn iterator(&self, options: &TraverseOptions) -> Result<Vec<LogRecord>, DbError> {
        let entries = self.store.traverse(options).await?;

        let mut removed: HashSet<ObjectId> = HashSet::new();
        let mut decoded = Vec::with_capacity(entries.len());

        for entry in entries {
            match postcard::from_bytes::<FeedOp>(&entry.payload) {
                Ok(FeedOp::Remove(target)) => {
                    removed.insert(target);
                }
                Ok(FeedOp::Add(payload)) => {
                    decoded.push((entry.hash, entry.identity, payload));
                }
                Err(e) => {
                    warn!(hash = %entry.hash, "skipping undecodable feed entry: {e}");
                }
            }
        }

        Ok(decoded
            .into_iter()
            .filter(|(hash, _, _)| !removed.contains(hash))
            .map(|(hash, author, payload)| LogRecord {
                hash,
                author,
                payload: Bytes::from(payload),
            })
            .collect())
    }
}
