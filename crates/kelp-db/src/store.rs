//! The base store: one operation log plus its collaborators.

use std::sync::Arc;

use bytes::Bytes;
use kelp_keystore::{Keystore, KeystoreError};
use kelp_oplog::{AccessController, Entry, OpLog, TraverseOptions};
use kelp_store::{CacheBucket, ObjectStore};
use kelp_types::{Address, ObjectId, ReplicaId, StoreKind};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::error::DbError;
use crate::events::StoreEvent;

/// Buffer for the store's event channel.
const EVENT_CAPACITY: usize = 256;

/// A typed database: one operation log, its access controller, and the
/// handles it needs to persist and announce entries.
///
/// All mutations of the log are serialized through one async mutex —
/// concurrent appends and merges on the same store are ordered, while
/// different stores proceed independently.
pub struct Store {
    address: Address,
    address_string: String,
    kind: StoreKind,
    oplog: Mutex<OpLog>,
    access: AccessController,
    objects: Arc<dyn ObjectStore>,
    keystore: Arc<Keystore>,
    key_id: String,
    identity: ReplicaId,
    /// The exclusively held cache bucket; taken on close.
    cache: std::sync::Mutex<Option<CacheBucket>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        address: Address,
        kind: StoreKind,
        access: AccessController,
        objects: Arc<dyn ObjectStore>,
        keystore: Arc<Keystore>,
        key_id: String,
        identity: ReplicaId,
        cache: CacheBucket,
    ) -> Self {
        let address_string = address.to_string();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            oplog: Mutex::new(OpLog::new(address_string.clone())),
            address,
            address_string,
            kind,
            access,
            objects,
            keystore,
            key_id,
            identity,
            cache: std::sync::Mutex::new(Some(cache)),
            events,
        }
    }

    /// The database address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The database kind.
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// The local author identity.
    pub fn identity(&self) -> ReplicaId {
        self.identity
    }

    /// The access controller governing this database.
    pub fn access(&self) -> &AccessController {
        &self.access
    }

    /// Subscribe to the store's lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    /// Run `f` against the cache bucket, failing if the store is closed.
    fn with_cache<T>(&self, f: impl FnOnce(&CacheBucket) -> Result<T, DbError>) -> Result<T, DbError> {
        let guard = self.cache.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(bucket) => f(bucket),
            None => Err(DbError::StoreClosed(self.address_string.clone())),
        }
    }

    /// Warm restart: merge the cached heads back out of the object store,
    /// then announce readiness.
    pub(crate) async fn load(&self) -> Result<(), DbError> {
        let cached = self.with_cache(|bucket| Ok(bucket.heads()?))?;

        let heads = if cached.is_empty() {
            Vec::new()
        } else {
            let mut oplog = self.oplog.lock().await;
            let report = oplog
                .merge(&cached, self.objects.as_ref(), &self.access)
                .await?;
            debug!(
                address = %self.address_string,
                entries = report.added,
                "loaded history from cached heads"
            );
            report.heads
        };

        self.emit(StoreEvent::Ready {
            address: self.address_string.clone(),
            heads,
        });
        Ok(())
    }

    /// Append a payload to the log.
    ///
    /// In order: identity lookup, access check, object persistence,
    /// in-memory DAG update, cache heads update, write event. Any failure
    /// is fatal to this append; nothing is partially inserted.
    pub async fn append(&self, payload: Bytes) -> Result<Entry, DbError> {
        if self.is_closed() {
            return Err(DbError::StoreClosed(self.address_string.clone()));
        }

        let mut oplog = self.oplog.lock().await;

        let signing_key = self
            .keystore
            .get_key(&self.key_id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(self.key_id.clone()))?;

        let entry = oplog.create_entry(payload, &signing_key);
        if !self.access.can_append(&entry) {
            return Err(kelp_oplog::OplogError::AccessDenied(entry.identity).into());
        }

        self.objects.put(entry.to_bytes()?).await?;
        oplog.append(entry.clone(), &self.access)?;
        let heads = oplog.heads();
        drop(oplog);

        self.with_cache(|bucket| {
            bucket.set_heads(&heads)?;
            bucket.set_local_heads(&heads)?;
            Ok(())
        })?;

        debug!(address = %self.address_string, hash = %entry.hash, "appended entry");
        self.emit(StoreEvent::Write {
            address: self.address_string.clone(),
            entry: entry.clone(),
            heads,
        });

        Ok(entry)
    }

    /// Merge a remote head set, fetching unknown entries from the object
    /// store. Returns the number of entries added.
    pub async fn merge_remote_heads(&self, heads: &[ObjectId]) -> Result<usize, DbError> {
        if self.is_closed() {
            return Err(DbError::StoreClosed(self.address_string.clone()));
        }

        let mut oplog = self.oplog.lock().await;
        let report = oplog
            .merge(heads, self.objects.as_ref(), &self.access)
            .await?;
        drop(oplog);

        if report.added > 0 {
            self.with_cache(|bucket| Ok(bucket.set_heads(&report.heads)?))?;

            info!(
                address = %self.address_string,
                added = report.added,
                "replicated remote entries"
            );
            self.emit(StoreEvent::Replicated {
                address: self.address_string.clone(),
                heads: report.heads.clone(),
            });
        }

        Ok(report.added)
    }

    /// Deterministic linearized traversal of the log.
    pub async fn traverse(&self, options: &TraverseOptions) -> Result<Vec<Entry>, DbError> {
        let oplog = self.oplog.lock().await;
        Ok(oplog.traverse(options)?)
    }

    /// Look up a single entry by hash.
    pub async fn entry(&self, id: &ObjectId) -> Option<Entry> {
        self.oplog.lock().await.get(id).cloned()
    }

    /// The current head set.
    pub async fn heads(&self) -> Vec<ObjectId> {
        self.oplog.lock().await.heads()
    }

    /// Number of entries in the log.
    pub async fn len(&self) -> usize {
        self.oplog.lock().await.len()
    }

    /// Whether the log holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.oplog.lock().await.is_empty()
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.cache.lock().expect("lock poisoned").is_none()
    }

    /// Close the store: release the cache bucket and notify listeners.
    /// Idempotent.
    pub(crate) fn close(&self) {
        let released = self.cache.lock().expect("lock poisoned").take().is_some();

        if released {
            info!(address = %self.address_string, "closed store");
            self.emit(StoreEvent::Closed {
                address: self.address_string.clone(),
            });
        }
    }
}
