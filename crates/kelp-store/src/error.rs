//! Error types for the storage crate.

/// Errors that can occur in the object store or cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The cache bucket is already held by another store.
    #[error("cache bucket already held: {0}")]
    BucketHeld(String),
}

impl From<postcard::Error> for StoreError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
