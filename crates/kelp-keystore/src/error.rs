//! Error types for the keystore crate.

/// Errors that can occur during keystore operations.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// No key stored under the given id.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A key with the given id already exists.
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),
}
