//! Grow-only counter.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use kelp_oplog::TraverseOptions;
use kelp_types::{ObjectId, ReplicaId, StoreKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::check_kind;
use crate::error::DbError;
use crate::store::Store;

/// Counter state carried in entry payloads: the author's cumulative total
/// after the increment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CounterOp {
    total: u64,
}

/// A G-counter: each identity only ever raises its own total, and the
/// counter's value is the sum of per-identity maxima. Publishing totals
/// rather than deltas makes replays and duplicates harmless.
pub struct Counter {
    store: Arc<Store>,
}

impl Counter {
    /// Wrap a counter-flavored store.
    pub fn new(store: Arc<Store>) -> Result<Self, DbError> {
        check_kind(&store, StoreKind::Counter)?;
        Ok(Self { store })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Per-identity maxima over all increment entries.
    async fn totals(&self) -> Result<BTreeMap<ReplicaId, u64>, DbError> {
        let entries = self.store.traverse(&TraverseOptions::default()).await?;
        let mut totals: BTreeMap<ReplicaId, u64> = BTreeMap::new();

        for entry in entries {
            match postcard::from_bytes::<CounterOp>(&entry.payload) {
                Ok(op) => {
                    let current = totals.entry(entry.identity).or_insert(0);
                    *current = (*current).max(op.total);
                }
                Err(e) => {
                    warn!(hash = %entry.hash, "skipping undecodable counter entry: {e}");
                }
            }
        }

        Ok(totals)
    }

    /// Increase the counter by `amount`; returns the new entry's hash.
    pub async fn inc(&self, amount: u64) -> Result<ObjectId, DbError> {
        let own = self
            .totals()
            .await?
            .get(&self.store.identity())
            .copied()
            .unwrap_or(0);

        let op = CounterOp {
            total: own.saturating_add(amount),
        };
        let bytes = postcard::to_allocvec(&op)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(self.store.append(Bytes::from(bytes)).await?.hash)
    }

    /// The counter's current value: the sum over per-identity maxima.
    pub async fn value(&self) -> Result<u64, DbError> {
        Ok(self.totals().await?.values().sum())
    }
}
