//! Peer-to-peer replicated databases over a content-addressed log.
//!
//! A Kelp database is a named, typed, replicated log. Entries are
//! immutable, signed, content-addressed records forming a DAG of causal
//! history; peers append concurrently and converge by gossiping head sets
//! over pub/sub and merging. The five database flavors (event log, feed,
//! key/value, counter, document store) are read projections over the same
//! underlying log.
//!
//! [`KelpDb`] is the entry point: it mints addresses, resolves manifests,
//! instantiates typed stores, and wires them to replication.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kelp_db::{KelpConfig, KelpDb};
//! use kelp_keystore::Keystore;
//! use kelp_pubsub::{MemoryHub, MemoryPubSub};
//! use kelp_store::{Cache, MemoryObjectStore};
//!
//! # async fn example() -> Result<(), kelp_db::DbError> {
//! let hub = MemoryHub::new();
//! let keystore = Arc::new(Keystore::in_memory());
//! let identity = keystore.create_key("self")?;
//! let db = KelpDb::new(
//!     Arc::new(MemoryObjectStore::new()),
//!     keystore,
//!     Arc::new(MemoryPubSub::new(hub, identity)),
//!     Cache::in_memory(),
//!     KelpConfig::default(),
//! )?;
//!
//! let log = db.eventlog("journal").await?;
//! log.add("hello world").await?;
//! # Ok(())
//! # }
//! ```

mod adapters;
mod error;
mod events;
mod manager;
mod manifest;
mod replicator;
mod store;

#[cfg(test)]
mod tests;

pub use adapters::{Counter, DocStore, EventLog, Feed, KeyValue, LogRecord};
pub use error::DbError;
pub use events::StoreEvent;
pub use manager::{KelpConfig, KelpDb};
pub use manifest::Manifest;
pub use store::Store;

// The pieces of the lower layers that make up the public API surface.
pub use kelp_oplog::{AccessController, Capability, Entry, TraverseOptions};
pub use kelp_types::{
    Address, CreateOptions, LamportClock, ObjectId, OpenOptions, ReplicaId, StoreKind, Writer,
};
