//! Partitioned local cache.
//!
//! The cache holds per-database resume state, partitioned into one bucket
//! per `(manifest hash, name)` pair. Each bucket has three slots:
//!
//! - `manifest` — the database's root hash, written at create/open time.
//!   Its presence is what "this database has been seen locally" means.
//! - `_heads` — the last known DAG heads, for warm restart.
//! - `_localHeads` — the heads this peer itself authored.
//!
//! A bucket is exclusively held by the store that opened it; opening a
//! bucket twice fails until the first handle is dropped.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use kelp_types::{Address, ObjectId};
use tracing::debug;

use crate::error::StoreError;

const MANIFEST_SLOT: &str = "manifest";
const HEADS_SLOT: &str = "_heads";
const LOCAL_HEADS_SLOT: &str = "_localHeads";

fn storage_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Inner backend: fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        buckets: Keyspace,
    },
    Memory(RwLock<BTreeMap<String, Vec<u8>>>),
}

struct CacheInner {
    backend: Backend,
    /// Bucket prefixes currently held by a live [`CacheBucket`].
    held: Mutex<HashSet<String>>,
}

/// Local cache, partitioned into per-database buckets.
///
/// Cheap to clone (`Arc` inside); all clones share the same backend and
/// the same exclusivity bookkeeping.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Open a persistent cache at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        let buckets = db
            .keyspace("buckets", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                backend: Backend::Fjall { db, buckets },
                held: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Create a volatile in-memory cache.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend: Backend::Memory(RwLock::new(BTreeMap::new())),
                held: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Acquire the bucket for a database address.
    ///
    /// Fails with [`StoreError::BucketHeld`] while another handle to the
    /// same bucket is alive; dropping the handle releases it.
    pub fn bucket(&self, address: &Address) -> Result<CacheBucket, StoreError> {
        let prefix = format!("{}/{}", address.root(), address.path());

        {
            let mut held = self.inner.held.lock().expect("lock poisoned");
            if !held.insert(prefix.clone()) {
                return Err(StoreError::BucketHeld(prefix));
            }
        }

        debug!(bucket = %prefix, "acquired cache bucket");
        Ok(CacheBucket {
            inner: self.inner.clone(),
            prefix,
        })
    }
}

/// Exclusive handle to one database's cache bucket.
pub struct CacheBucket {
    inner: Arc<CacheInner>,
    prefix: String,
}

impl CacheBucket {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = format!("{}/{slot}", self.prefix);

        match &self.inner.backend {
            Backend::Fjall { buckets, .. } => Ok(buckets
                .get(key.as_bytes())
                .map_err(storage_err)?
                .map(|v| v.to_vec())),
            Backend::Memory(m) => Ok(m.read().expect("lock poisoned").get(&key).cloned()),
        }
    }

    fn set(&self, slot: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let key = format!("{}/{slot}", self.prefix);

        match &self.inner.backend {
            Backend::Fjall { buckets, .. } => {
                buckets.insert(key.as_bytes(), value).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.write().expect("lock poisoned").insert(key, value);
            }
        }
        Ok(())
    }

    /// Read the manifest slot: the root hash, if this database has been
    /// seen locally.
    pub fn manifest_slot(&self) -> Result<Option<ObjectId>, StoreError> {
        match self.get(MANIFEST_SLOT)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write the manifest slot.
    pub fn set_manifest_slot(&self, root: ObjectId) -> Result<(), StoreError> {
        self.set(MANIFEST_SLOT, postcard::to_allocvec(&root)?)
    }

    /// Read the last known heads (empty when never written).
    pub fn heads(&self) -> Result<Vec<ObjectId>, StoreError> {
        match self.get(HEADS_SLOT)? {
            Some(bytes) => Ok(postcard::from_bytes(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist the last known heads.
    pub fn set_heads(&self, heads: &[ObjectId]) -> Result<(), StoreError> {
        self.set(HEADS_SLOT, postcard::to_allocvec(heads)?)
    }

    /// Read the heads this peer itself authored (empty when never written).
    pub fn local_heads(&self) -> Result<Vec<ObjectId>, StoreError> {
        match self.get(LOCAL_HEADS_SLOT)? {
            Some(bytes) => Ok(postcard::from_bytes(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist the locally authored heads.
    pub fn set_local_heads(&self, heads: &[ObjectId]) -> Result<(), StoreError> {
        self.set(LOCAL_HEADS_SLOT, postcard::to_allocvec(heads)?)
    }
}

impl Drop for CacheBucket {
    fn drop(&mut self) {
        let mut held = self.inner.held.lock().expect("lock poisoned");
        held.remove(&self.prefix);
        debug!(bucket = %self.prefix, "released cache bucket");
    }
}
