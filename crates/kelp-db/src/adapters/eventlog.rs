//! Append-only event log.

use std::sync::Arc;

use bytes::Bytes;
use kelp_oplog::TraverseOptions;
use kelp_types::{ObjectId, StoreKind};

use super::{LogRecord, check_kind};
use crate::error::DbError;
use crate::store::Store;

/// The simplest projection: every entry, in causal order.
pub struct EventLog {
    store: Arc<Store>,
}

impl EventLog {
    /// Wrap an eventlog-flavored store.
    pub fn new(store: Arc<Store>) -> Result<Self, DbError> {
        check_kind(&store, StoreKind::EventLog)?;
        Ok(Self { store })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Append a payload; returns the new entry's hash.
    pub async fn add(&self, payload: impl Into<Bytes>) -> Result<ObjectId, DbError> {
        Ok(self.store.append(payload.into()).await?.hash)
    }

    /// Look up a single record by entry hash.
    pub async fn get(&self, hash: ObjectId) -> Result<Option<LogRecord>, DbError> {
        Ok(self.store.entry(&hash).await.map(|entry| LogRecord {
            hash: entry.hash,
            author: entry.identity,
            payload: entry.payload,
        }))
    }

    /// Enumerate records in the linearized causal order.
    pub async fn iterator(&self, options: &TraverseOptions) -> Result<Vec<LogRecord>, DbError> {
        let entries = self.store.traverse(options).await?;
        Ok(entries
            .into_iter()
            .map(|entry| LogRecord {
                hash: entry.hash,
                author: entry.identity,
                payload: entry.payload,
            })
            .collect())
    }
}
