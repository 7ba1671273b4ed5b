//! Core trait for content-addressed object storage.

use bytes::Bytes;
use kelp_types::ObjectId;

use crate::error::StoreError;

/// Trait for storing and retrieving content-addressed objects.
///
/// The address of an object is `blake3(bytes)`, stable across peers, so a
/// `put` is idempotent by construction and a `get` for a known address can
/// be answered by any replica. All implementations must be `Send + Sync`
/// for use across async tasks; data travels as [`Bytes`] to keep fetches
/// zero-copy.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, returning its content address.
    async fn put(&self, data: Bytes) -> Result<ObjectId, StoreError>;

    /// Retrieve an object by address. Returns `None` if not present.
    async fn get(&self, id: ObjectId) -> Result<Option<Bytes>, StoreError>;

    /// Check whether an object is present.
    async fn has(&self, id: ObjectId) -> Result<bool, StoreError>;
}
