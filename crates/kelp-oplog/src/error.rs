//! Error types for the operation log.

use kelp_types::{ObjectId, ReplicaId};

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum OplogError {
    /// Entry hash or signature verification failed.
    #[error("entry failed integrity verification: {0}")]
    Integrity(ObjectId),

    /// The author is not permitted by the access controller.
    #[error("access denied for identity {0}")]
    AccessDenied(ReplicaId),

    /// A referenced entry could not be fetched from the object store.
    #[error("entry not found in object store: {0}")]
    MissingEntry(ObjectId),

    /// A traversal boundary hash is not present in the log.
    #[error("unknown traversal boundary: {0}")]
    UnknownBoundary(ObjectId),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Object store error.
    #[error(transparent)]
    Store(#[from] kelp_store::StoreError),
}

impl From<postcard::Error> for OplogError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
