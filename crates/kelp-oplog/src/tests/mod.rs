//! Tests for the operation log crate.

mod access_tests;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use kelp_store::MemoryObjectStore;
use kelp_types::ReplicaId;

use crate::access::{AccessController, Capability};
use crate::entry::Entry;
use crate::log::OpLog;

/// Create a test (ReplicaId, SigningKey) pair from a seed.
fn test_identity(seed: u8) -> (ReplicaId, SigningKey) {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let replica = ReplicaId::from(signing_key.verifying_key());
    (replica, signing_key)
}

/// An access controller that lets anyone write.
fn open_access() -> AccessController {
    let mut access = AccessController::new();
    access.grant_any_write();
    access
}

/// An access controller restricted to the given writers.
fn writer_access(writers: &[ReplicaId]) -> AccessController {
    let mut access = AccessController::new();
    for writer in writers {
        access.grant(Capability::Write, *writer);
    }
    access
}

/// Append a payload to `log` and persist the entry in `objects`, the way a
/// store does: the canonical bytes land under the entry's own hash.
async fn append_and_store(
    log: &mut OpLog,
    objects: &MemoryObjectStore,
    key: &SigningKey,
    access: &AccessController,
    payload: &[u8],
) -> Entry {
    use kelp_store::ObjectStore;

    let entry = log.create_entry(Bytes::copy_from_slice(payload), key);
    let stored = objects.put(entry.to_bytes().unwrap()).await.unwrap();
    assert_eq!(stored, entry.hash, "object address must equal entry hash");
    log.append(entry.clone(), access).unwrap();
    entry
}
