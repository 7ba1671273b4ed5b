//! The replicated operation log at the heart of every Kelp database.
//!
//! An [`OpLog`] is an append-only DAG of [`Entry`] records. Each entry is
//! signed by its author, content-addressed by the blake3 hash of its
//! canonical encoding, and linked to its causal parents by hash. Peers
//! converge by exchanging head sets and merging: unknown ancestors are
//! fetched from the shared object store, verified against the log's
//! [`AccessController`], and inserted in topological order. Merging is
//! commutative, associative, and idempotent, so gossip can be best-effort.

mod access;
mod entry;
mod error;
mod log;

#[cfg(test)]
mod tests;

pub use access::{AccessController, Capability};
pub use entry::Entry;
pub use error::OplogError;
pub use log::{EntryFetcher, MergeReport, OpLog, TraverseOptions};
