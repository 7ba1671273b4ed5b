//! Storage services for Kelp: the content-addressed object store and the
//! partitioned local cache.
//!
//! Both services exist in two flavors — pure in-memory (volatile, for tests
//! and ephemeral nodes) and fjall-backed (durable). The object store is the
//! shared home of every addressed object (entries, manifests, access lists);
//! the cache holds per-database resume state (manifest slot, last known
//! heads) in one exclusively-held bucket per database.

mod cache;
mod error;
mod fjall_store;
mod memory_store;
mod traits;

pub use cache::{Cache, CacheBucket};
pub use error::StoreError;
pub use fjall_store::FjallObjectStore;
pub use memory_store::MemoryObjectStore;
pub use traits::ObjectStore;
