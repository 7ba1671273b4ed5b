//! Manager lifecycle: create, open, close, and their failure modes.

use std::sync::Arc;
use std::time::Duration;

use kelp_types::{Address, CreateOptions, ObjectId, OpenOptions, StoreKind};

use super::TestNet;
use crate::adapters::EventLog;
use crate::error::DbError;
use crate::events::StoreEvent;
use crate::TraverseOptions;

#[tokio::test]
async fn test_create_then_reopen_full_history() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .create("log-1", StoreKind::EventLog, CreateOptions::default())
        .await
        .unwrap();
    let address = store.address().clone();

    let log = EventLog::new(store).unwrap();
    for i in 0..100 {
        log.add(format!("hello{i}")).await.unwrap();
    }

    db.close(&address).await.unwrap();

    // Reopen by address: history comes back from the cached heads and the
    // object store, no network involved.
    let reopened = db
        .open(&address.to_string(), OpenOptions::default())
        .await
        .unwrap();
    assert_eq!(reopened.len().await, 100);

    let log = EventLog::new(reopened).unwrap();
    let records = log
        .iterator(&TraverseOptions {
            limit: -1,
            ..TraverseOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 100);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.payload, format!("hello{i}"));
    }
}

#[tokio::test]
async fn test_create_rejects_address_as_name() {
    let net = TestNet::new();
    let db = net.peer();

    let bogus = Address::new(ObjectId::from_data(b"root"), "name").to_string();
    let result = db
        .create(&bogus, StoreKind::EventLog, CreateOptions::default())
        .await;
    assert!(matches!(result, Err(DbError::NameIsAddress(_))));
}

#[tokio::test]
async fn test_create_existing_database_fails_without_overwrite() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .create("dup", StoreKind::Feed, CreateOptions::default())
        .await
        .unwrap();
    let address = store.address().clone();

    // While the store is open, the database plainly already exists.
    let result = db.create("dup", StoreKind::Feed, CreateOptions::default()).await;
    assert!(matches!(result, Err(DbError::AlreadyExists(_))));

    // Closed but remembered in the cache: still already exists.
    db.close(&address).await.unwrap();
    let result = db.create("dup", StoreKind::Feed, CreateOptions::default()).await;
    assert!(matches!(result, Err(DbError::AlreadyExists(_))));

    // Overwrite is the explicit way through.
    let store = db
        .create(
            "dup",
            StoreKind::Feed,
            CreateOptions {
                overwrite: true,
                ..CreateOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(store.address(), &address, "same identity, same address");
}

#[tokio::test]
async fn test_open_invalid_reference_fails_without_create() {
    let net = TestNet::new();
    let db = net.peer();

    let result = db.open("not-an-address", OpenOptions::default()).await;
    assert!(matches!(result, Err(DbError::InvalidAddress(_))));

    // create without a kind is also invalid.
    let result = db
        .open(
            "not-an-address",
            OpenOptions {
                create: true,
                ..OpenOptions::default()
            },
        )
        .await;
    assert!(matches!(result, Err(DbError::InvalidAddress(_))));
}

#[tokio::test]
async fn test_open_bare_name_with_create_builds_the_database() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .open("fresh", OpenOptions::create(StoreKind::KeyValue))
        .await
        .unwrap();

    assert_eq!(store.kind(), StoreKind::KeyValue);
    assert_eq!(store.address().path(), "fresh");
    assert!(Address::is_address(&store.address().to_string()));
}

#[tokio::test]
async fn test_kind_mismatch_on_reopen() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .create("kv", StoreKind::KeyValue, CreateOptions::default())
        .await
        .unwrap();
    let address = store.address().clone();

    // Mismatch against the live store.
    let result = db
        .open(
            &address.to_string(),
            OpenOptions {
                kind: Some(StoreKind::EventLog),
                ..OpenOptions::default()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(DbError::KindMismatch {
            requested: StoreKind::EventLog,
            actual: StoreKind::KeyValue,
        })
    ));

    // Mismatch against the manifest after closing.
    db.close(&address).await.unwrap();
    let result = db
        .open(
            &address.to_string(),
            OpenOptions {
                kind: Some(StoreKind::EventLog),
                ..OpenOptions::default()
            },
        )
        .await;
    assert!(matches!(result, Err(DbError::KindMismatch { .. })));
}

#[tokio::test]
async fn test_local_only_miss_fails_not_found() {
    let net = TestNet::new();
    let db = net.peer();

    let never_seen = Address::new(ObjectId::from_data(b"elsewhere"), "ghost");
    let result = db
        .open(
            &never_seen.to_string(),
            OpenOptions {
                local_only: true,
                ..OpenOptions::default()
            },
        )
        .await;
    assert!(matches!(result, Err(DbError::NotFound(_))));
}

#[tokio::test]
async fn test_open_same_address_returns_same_store() {
    let net = TestNet::new();
    let db = net.peer();

    let first = db
        .create("shared", StoreKind::EventLog, CreateOptions::default())
        .await
        .unwrap();
    let second = db
        .open(&first.address().to_string(), OpenOptions::default())
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_store_emits_write_and_close_events() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .create("events", StoreKind::EventLog, CreateOptions::default())
        .await
        .unwrap();
    let address = store.address().clone();
    let mut events = store.subscribe();

    let log = EventLog::new(store).unwrap();
    let hash = log.add("observed").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.address(), address.to_string());
    match event {
        StoreEvent::Write { entry, heads, .. } => {
            assert_eq!(entry.hash, hash);
            assert_eq!(heads, vec![hash]);
        }
        other => panic!("expected a write event, got {other:?}"),
    }

    db.close(&address).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, StoreEvent::Closed { .. }));
}

#[tokio::test]
async fn test_closed_store_rejects_appends() {
    let net = TestNet::new();
    let db = net.peer();

    let store = db
        .create("closing", StoreKind::EventLog, CreateOptions::default())
        .await
        .unwrap();
    let address = store.address().clone();

    db.close(&address).await.unwrap();
    assert!(store.is_closed());

    let result = store.append("too late".into()).await;
    assert!(matches!(result, Err(DbError::StoreClosed(_))));
}

#[tokio::test]
async fn test_disconnect_closes_every_store() {
    let net = TestNet::new();
    let db = net.peer();

    let a = db
        .create("one", StoreKind::EventLog, CreateOptions::default())
        .await
        .unwrap();
    let b = db
        .create("two", StoreKind::Feed, CreateOptions::default())
        .await
        .unwrap();

    db.disconnect().await.unwrap();
    assert!(a.is_closed());
    assert!(b.is_closed());

    // The active map is empty: reopening builds a fresh store.
    let reopened = db
        .open(&a.address().to_string(), OpenOptions::default())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &reopened));
}
