//! Capability-list access control for a database.

use std::collections::BTreeSet;

use bytes::Bytes;
use kelp_store::ObjectStore;
use kelp_types::{ObjectId, ReplicaId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::Entry;
use crate::error::OplogError;

/// The two capabilities a key can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// May amend the capability list.
    Admin,
    /// May author entries.
    Write,
}

/// A capability list mapping admin/write to sets of public keys.
///
/// Persisted as its own content-addressed object; the manifest references
/// it by hash. `BTreeSet` keeps the encoding canonical, so the same list
/// always persists to the same address. The wildcard writer (`"*"` in
/// other renderings) is the `any_writer` flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessController {
    admins: BTreeSet<ReplicaId>,
    writers: BTreeSet<ReplicaId>,
    any_writer: bool,
}

impl AccessController {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability to a key.
    pub fn grant(&mut self, capability: Capability, key: ReplicaId) {
        match capability {
            Capability::Admin => self.admins.insert(key),
            Capability::Write => self.writers.insert(key),
        };
    }

    /// Grant write access to any identity (the wildcard writer).
    pub fn grant_any_write(&mut self) {
        self.any_writer = true;
    }

    /// The admin keys.
    pub fn admins(&self) -> impl Iterator<Item = &ReplicaId> {
        self.admins.iter()
    }

    /// The writer keys.
    pub fn writers(&self) -> impl Iterator<Item = &ReplicaId> {
        self.writers.iter()
    }

    /// Whether the key holds the admin capability.
    pub fn is_admin(&self, key: &ReplicaId) -> bool {
        self.admins.contains(key)
    }

    /// Whether any identity may write.
    pub fn allows_any_writer(&self) -> bool {
        self.any_writer
    }

    /// Whether an entry is admissible: its author must be a writer, an
    /// admin, or covered by the wildcard, and its signature must verify.
    pub fn can_append(&self, entry: &Entry) -> bool {
        let permitted = self.any_writer
            || self.writers.contains(&entry.identity)
            || self.admins.contains(&entry.identity);
        permitted && entry.verify_signature()
    }

    /// Persist the canonical encoding to the object store and return its
    /// address.
    pub async fn save(&self, objects: &dyn ObjectStore) -> Result<ObjectId, OplogError> {
        let bytes = postcard::to_allocvec(self)?;
        let id = objects.put(Bytes::from(bytes)).await?;
        debug!(address = %id, "persisted access controller");
        Ok(id)
    }

    /// Fetch and decode a capability list from the object store.
    pub async fn load(objects: &dyn ObjectStore, id: ObjectId) -> Result<Self, OplogError> {
        let bytes = objects
            .get(id)
            .await?
            .ok_or(OplogError::MissingEntry(id))?;
        Ok(postcard::from_bytes(&bytes)?)
    }
}
