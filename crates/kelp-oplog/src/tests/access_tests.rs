//! Access-controller enforcement, locally and during merge.

use bytes::Bytes;
use kelp_store::MemoryObjectStore;

use super::{append_and_store, open_access, test_identity, writer_access};
use crate::access::{AccessController, Capability};
use crate::error::OplogError;
use crate::log::OpLog;

#[test]
fn test_local_append_denied_for_non_writer() {
    let (writer, _) = test_identity(1);
    let (_, intruder_key) = test_identity(2);
    let access = writer_access(&[writer]);

    let mut log = OpLog::new("/kelp/test/priv");
    let entry = log.create_entry(Bytes::from_static(b"nope"), &intruder_key);
    let result = log.append(entry, &access);

    assert!(matches!(result, Err(OplogError::AccessDenied(_))));
    assert!(log.is_empty(), "a denied append inserts nothing");
}

#[test]
fn test_admin_may_write() {
    let (admin, admin_key) = test_identity(3);
    let mut access = AccessController::new();
    access.grant(Capability::Admin, admin);

    let mut log = OpLog::new("/kelp/test/admin");
    let entry = log.create_entry(Bytes::from_static(b"by admin"), &admin_key);
    log.append(entry, &access).unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn test_wildcard_writer_admits_anyone() {
    let (_, key) = test_identity(9);
    let access = open_access();

    let mut log = OpLog::new("/kelp/test/open");
    let entry = log.create_entry(Bytes::from_static(b"hello"), &key);
    assert!(access.can_append(&entry));
    log.append(entry, &access).unwrap();
}

#[test]
fn test_can_append_requires_valid_signature() {
    let (writer, writer_key) = test_identity(1);
    let access = writer_access(&[writer]);

    let log = OpLog::new("/kelp/test/sig");
    let mut entry = log.create_entry(Bytes::from_static(b"signed"), &writer_key);
    assert!(access.can_append(&entry));

    entry.payload = Bytes::from_static(b"altered after signing");
    assert!(
        !access.can_append(&entry),
        "a permitted identity with a broken signature is still denied"
    );
}

#[tokio::test]
async fn test_merge_rejects_forged_entries() {
    let (writer, writer_key) = test_identity(1);
    let (_, forger_key) = test_identity(2);
    let objects = MemoryObjectStore::new();
    let access = writer_access(&[writer]);

    // The legitimate peer writes two entries.
    let mut peer_a = OpLog::new("/kelp/test/forge");
    append_and_store(&mut peer_a, &objects, &writer_key, &access, b"real-1").await;
    append_and_store(&mut peer_a, &objects, &writer_key, &access, b"real-2").await;

    // The forger replicates the history, then appends with its own key,
    // side-stepping the access check on its own replica.
    let mut peer_b = OpLog::new("/kelp/test/forge");
    peer_b.merge(&peer_a.heads(), &objects, &access).await.unwrap();
    let forged = append_and_store(&mut peer_b, &objects, &forger_key, &open_access(), b"forged").await;

    // The legitimate peer merges the forger's heads: the forged entry is
    // dropped, the log is unchanged.
    let before = peer_a.heads();
    let report = peer_a.merge(&peer_b.heads(), &objects, &access).await.unwrap();

    assert_eq!(report.added, 0);
    assert_eq!(peer_a.len(), 2);
    assert_eq!(peer_a.heads(), before);
    assert!(!peer_a.contains(&forged.hash));
}

#[tokio::test]
async fn test_merge_keeps_verified_branch_drops_forged_descendants() {
    let (writer, writer_key) = test_identity(1);
    let (forger, forger_key) = test_identity(2);
    let objects = MemoryObjectStore::new();
    let strict = writer_access(&[writer]);
    let loose = writer_access(&[writer, forger]);

    // A mixed branch: one legitimate entry, then a forged one, then a
    // legitimate descendant of the forged entry.
    let mut peer_b = OpLog::new("/kelp/test/mixed");
    let good = append_and_store(&mut peer_b, &objects, &writer_key, &loose, b"good").await;
    let forged = append_and_store(&mut peer_b, &objects, &forger_key, &loose, b"forged").await;
    let orphaned = append_and_store(&mut peer_b, &objects, &writer_key, &loose, b"orphaned").await;

    let mut peer_a = OpLog::new("/kelp/test/mixed");
    let report = peer_a.merge(&peer_b.heads(), &objects, &strict).await.unwrap();

    assert_eq!(report.added, 1, "only the causally anchored entry survives");
    assert!(peer_a.contains(&good.hash));
    assert!(!peer_a.contains(&forged.hash));
    assert!(
        !peer_a.contains(&orphaned.hash),
        "a descendant of a rejected entry cannot be anchored"
    );
    assert_eq!(peer_a.heads(), vec![good.hash]);
}

#[tokio::test]
async fn test_access_controller_save_load_roundtrip() {
    let (admin, _) = test_identity(1);
    let (writer, _) = test_identity(2);
    let objects = MemoryObjectStore::new();

    let mut access = AccessController::new();
    access.grant(Capability::Admin, admin);
    access.grant(Capability::Write, writer);

    let address = access.save(&objects).await.unwrap();
    let loaded = AccessController::load(&objects, address).await.unwrap();
    assert_eq!(loaded, access);
    assert!(loaded.is_admin(&admin));
    assert!(!loaded.allows_any_writer());
    assert_eq!(loaded.admins().collect::<Vec<_>>(), vec![&admin]);
    assert_eq!(loaded.writers().collect::<Vec<_>>(), vec![&writer]);

    // The encoding is canonical: saving the same list lands on the same
    // address, and amending it moves the address.
    assert_eq!(access.save(&objects).await.unwrap(), address);

    let mut amended = access.clone();
    amended.grant_any_write();
    assert_ne!(amended.save(&objects).await.unwrap(), address);
}

#[tokio::test]
async fn test_load_missing_access_list_fails() {
    let objects = MemoryObjectStore::new();
    let ghost = kelp_types::ObjectId::from_data(b"no such list");
    assert!(matches!(
        AccessController::load(&objects, ghost).await,
        Err(OplogError::MissingEntry(_))
    ));
}
