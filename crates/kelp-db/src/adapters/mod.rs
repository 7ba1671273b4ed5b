//! Typed store adapters: read projections over the log.
//!
//! Each adapter interprets the payloads of one database flavor. The
//! projections are pure functions of the log's deterministic traversal;
//! writes always go through [`Store::append`] and never mutate history.

mod counter;
mod docstore;
mod eventlog;
mod feed;
mod keyvalue;

use std::sync::Arc;

use bytes::Bytes;
use kelp_types::{ObjectId, ReplicaId, StoreKind};

pub use counter::Counter;
pub use docstore::DocStore;
pub use eventlog::EventLog;
pub use feed::Feed;
pub use keyvalue::KeyValue;

use crate::error::DbError;
use crate::store::Store;

/// A payload record surfaced by log-shaped projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Hash of the entry carrying the payload.
    pub hash: ObjectId,
    /// The entry's author.
    pub author: ReplicaId,
    /// The payload bytes.
    pub payload: Bytes,
}

/// Reject wrapping a store of the wrong flavor.
fn check_kind(store: &Arc<Store>, requested: StoreKind) -> Result<(), DbError> {
    if store.kind() != requested {
        return Err(DbError::KindMismatch {
            requested,
            actual: store.kind(),
        });
    }
    Ok(())
}
