//! Error types for the database layer.

use kelp_types::StoreKind;

/// Errors that can occur in the database layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A kind name outside the valid set.
    #[error(transparent)]
    InvalidKind(#[from] kelp_types::KindParseError),

    /// A malformed address where one was required.
    #[error("invalid database address: {0:?}")]
    InvalidAddress(String),

    /// `create` was given an address instead of a bare name.
    #[error("database name is an address: {0:?}")]
    NameIsAddress(String),

    /// The cache already holds a manifest for this database.
    #[error("database already exists: {0}")]
    AlreadyExists(String),

    /// Local-only open with no locally cached manifest, or a manifest
    /// missing from the object store.
    #[error("database not found: {0}")]
    NotFound(String),

    /// The manifest's kind disagrees with the requested kind.
    #[error("database kind mismatch: requested {requested}, manifest has {actual}")]
    KindMismatch {
        /// The kind the caller asked for.
        requested: StoreKind,
        /// The kind recorded in the manifest.
        actual: StoreKind,
    },

    /// Operation on a store that has been closed.
    #[error("store is closed: {0}")]
    StoreClosed(String),

    /// A wait for peers ran out of time.
    #[error("timed out waiting for peers on {0}")]
    Timeout(String),

    /// A document-store payload without a usable index field.
    #[error("invalid document: {0}")]
    Document(String),

    /// Operation log error (integrity, access, traversal).
    #[error(transparent)]
    Oplog(#[from] kelp_oplog::OplogError),

    /// Object store or cache error.
    #[error(transparent)]
    Store(#[from] kelp_store::StoreError),

    /// Keystore error.
    #[error(transparent)]
    Keystore(#[from] kelp_keystore::KeystoreError),

    /// Pub/sub bus error.
    #[error(transparent)]
    PubSub(#[from] kelp_pubsub::PubSubError),
}
