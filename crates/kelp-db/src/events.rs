//! Typed lifecycle events emitted by a store.

use kelp_oplog::Entry;
use kelp_types::ObjectId;

/// Events emitted on a store's broadcast channel.
///
/// One typed channel per store replaces string-keyed emitters: the
/// replication coordinator listens for `Write`, callers interested in
/// convergence listen for `Replicated`.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    /// History has been loaded; the store is usable.
    Ready {
        /// Canonical address of the store.
        address: String,
        /// The head set after loading.
        heads: Vec<ObjectId>,
    },

    /// A local append was applied.
    Write {
        /// Canonical address of the store.
        address: String,
        /// The appended entry.
        entry: Entry,
        /// The head set after the append.
        heads: Vec<ObjectId>,
    },

    /// A merge of remote heads made progress.
    Replicated {
        /// Canonical address of the store.
        address: String,
        /// The head set after the merge.
        heads: Vec<ObjectId>,
    },

    /// The store has been closed.
    Closed {
        /// Canonical address of the store.
        address: String,
    },
}

impl StoreEvent {
    /// The address of the store that emitted the event.
    pub fn address(&self) -> &str {
        match self {
            StoreEvent::Ready { address, .. }
            | StoreEvent::Write { address, .. }
            | StoreEvent::Replicated { address, .. }
            | StoreEvent::Closed { address } => address,
        }
    }
}
