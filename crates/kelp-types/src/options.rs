//! Options for creating and opening databases.

use crate::{ReplicaId, StoreKind};

/// A write-capability grant in a database's access list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Writer {
    /// Any identity may write (the `"*"` writer).
    Any,
    /// A specific public key may write.
    Key(ReplicaId),
}

/// Options for creating a database.
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// Identities granted write access. When empty, the creator's own key
    /// is granted write.
    pub write: Vec<Writer>,
    /// Replace an existing manifest slot for the same address instead of
    /// failing with "already exists".
    pub overwrite: bool,
    /// Subscribe the database for replication once open.
    pub replicate: Option<bool>,
}

/// Options for opening a database.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    /// Create the database when the reference is a bare name rather than
    /// an address. Requires `kind`.
    pub create: bool,
    /// Expected database kind. Opening fails when the manifest disagrees.
    pub kind: Option<StoreKind>,
    /// Fail with "not found" unless the local cache has already seen this
    /// database; never touches the network.
    pub local_only: bool,
    /// Subscribe the database for replication once open (default true).
    pub replicate: Option<bool>,
    /// Forwarded to create when `create` kicks in.
    pub write: Vec<Writer>,
    /// Forwarded to create when `create` kicks in.
    pub overwrite: bool,
}

impl OpenOptions {
    /// Options that create the database if the reference is a bare name.
    pub fn create(kind: StoreKind) -> Self {
        Self {
            create: true,
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Whether replication is requested (defaults to true).
    pub fn replicate_or_default(&self) -> bool {
        self.replicate.unwrap_or(true)
    }
}

impl CreateOptions {
    /// Whether replication is requested (defaults to true).
    pub fn replicate_or_default(&self) -> bool {
        self.replicate.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_options_create_sets_kind() {
        let opts = OpenOptions::create(StoreKind::Feed);
        assert!(opts.create);
        assert_eq!(opts.kind, Some(StoreKind::Feed));
        assert!(!opts.local_only);
    }

    #[test]
    fn test_replicate_defaults_to_true() {
        assert!(OpenOptions::default().replicate_or_default());
        assert!(CreateOptions::default().replicate_or_default());

        let opts = OpenOptions {
            replicate: Some(false),
            ..OpenOptions::default()
        };
        assert!(!opts.replicate_or_default());
    }
}
