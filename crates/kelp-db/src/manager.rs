//! The database manager: the top-level façade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kelp_keystore::Keystore;
use kelp_oplog::{AccessController, Capability};
use kelp_pubsub::PubSub;
use kelp_store::{Cache, ObjectStore, StoreError};
use kelp_types::{Address, CreateOptions, OpenOptions, ReplicaId, StoreKind, Writer};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::adapters::{Counter, DocStore, EventLog, Feed, KeyValue};
use crate::error::DbError;
use crate::manifest::Manifest;
use crate::replicator::Replicator;
use crate::store::Store;

/// Manager configuration.
#[derive(Clone, Debug)]
pub struct KelpConfig {
    /// Keystore id of the local signing key; created if absent.
    pub key_id: String,
    /// Delay between subscribing a database and announcing its heads, so
    /// the swarm has settled before the announcement goes out.
    pub settle_delay: Duration,
}

impl Default for KelpConfig {
    fn default() -> Self {
        Self {
            key_id: "self".to_string(),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// An open database and its replication hookup.
struct ActiveStore {
    store: Arc<Store>,
    replicator: Option<Replicator>,
}

/// The top-level façade: creates and opens databases, owns the map of
/// active stores, and wires stores to replication.
///
/// A process may host several managers; nothing here is global. The
/// object store, keystore, cache, and pub/sub bus are injected at
/// construction and shared by every store the manager opens.
pub struct KelpDb {
    objects: Arc<dyn ObjectStore>,
    keystore: Arc<Keystore>,
    pubsub: Arc<dyn PubSub>,
    cache: Cache,
    config: KelpConfig,
    identity: ReplicaId,
    stores: Mutex<HashMap<String, ActiveStore>>,
}

impl KelpDb {
    /// Build a manager, creating the local signing key if it is missing.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        keystore: Arc<Keystore>,
        pubsub: Arc<dyn PubSub>,
        cache: Cache,
        config: KelpConfig,
    ) -> Result<Self, DbError> {
        let identity = match keystore.public_key(&config.key_id)? {
            Some(identity) => identity,
            None => keystore.create_key(&config.key_id)?,
        };

        info!(%identity, key_id = %config.key_id, "database manager ready");

        Ok(Self {
            objects,
            keystore,
            pubsub,
            cache,
            config,
            identity,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// The local author identity.
    pub fn identity(&self) -> ReplicaId {
        self.identity
    }

    /// Create a new database.
    ///
    /// Builds and persists the access controller (creator as admin, the
    /// requested writers or, by default, the creator), persists the
    /// manifest, records it in the local cache, and opens the store.
    pub async fn create(
        &self,
        name: &str,
        kind: StoreKind,
        options: CreateOptions,
    ) -> Result<Arc<Store>, DbError> {
        if Address::is_address(name) {
            return Err(DbError::NameIsAddress(name.to_string()));
        }

        let mut access = AccessController::new();
        access.grant(Capability::Admin, self.identity);
        if options.write.is_empty() {
            access.grant(Capability::Write, self.identity);
        } else {
            for writer in &options.write {
                match writer {
                    Writer::Any => access.grant_any_write(),
                    Writer::Key(key) => access.grant(Capability::Write, *key),
                }
            }
        }

        let access_addr = access.save(self.objects.as_ref()).await?;
        let manifest = Manifest::new(name, kind, access_addr);
        let root = manifest.save(self.objects.as_ref()).await?;
        let address = Address::new(root, name);

        {
            // A held bucket means the database is open right now.
            let bucket = self.cache.bucket(&address).map_err(|e| match e {
                StoreError::BucketHeld(_) => DbError::AlreadyExists(address.to_string()),
                other => DbError::Store(other),
            })?;

            if bucket.manifest_slot()?.is_some() && !options.overwrite {
                return Err(DbError::AlreadyExists(address.to_string()));
            }
            bucket.set_manifest_slot(root)?;
        }

        info!(%address, %kind, "created database");

        self.open_address(
            address,
            OpenOptions {
                kind: Some(kind),
                replicate: options.replicate,
                ..OpenOptions::default()
            },
        )
        .await
    }

    /// Open a database by address, or create it when `reference` is a
    /// bare name and the options ask for creation.
    pub async fn open(
        &self,
        reference: &str,
        options: OpenOptions,
    ) -> Result<Arc<Store>, DbError> {
        match reference.parse::<Address>() {
            Ok(address) => self.open_address(address, options).await,
            Err(_) => match (options.create, options.kind) {
                (true, Some(kind)) => {
                    self.create(
                        reference,
                        kind,
                        CreateOptions {
                            write: options.write.clone(),
                            overwrite: true,
                            replicate: options.replicate,
                        },
                    )
                    .await
                }
                _ => Err(DbError::InvalidAddress(reference.to_string())),
            },
        }
    }

    async fn open_address(
        &self,
        address: Address,
        options: OpenOptions,
    ) -> Result<Arc<Store>, DbError> {
        let key = address.to_string();
        let mut stores = self.stores.lock().await;

        // Opening the same address twice returns the same store.
        if let Some(active) = stores.get(&key) {
            if let Some(requested) = options.kind
                && requested != active.store.kind()
            {
                return Err(DbError::KindMismatch {
                    requested,
                    actual: active.store.kind(),
                });
            }
            debug!(address = %key, "store already open");
            return Ok(active.store.clone());
        }

        let bucket = self.cache.bucket(&address)?;

        if options.local_only && bucket.manifest_slot()?.is_none() {
            return Err(DbError::NotFound(key));
        }

        let manifest = Manifest::load(self.objects.as_ref(), address.root()).await?;

        if manifest.name != address.path() {
            return Err(DbError::InvalidAddress(key));
        }
        if let Some(requested) = options.kind
            && requested != manifest.kind
        {
            return Err(DbError::KindMismatch {
                requested,
                actual: manifest.kind,
            });
        }

        let access = AccessController::load(self.objects.as_ref(), manifest.access).await?;
        bucket.set_manifest_slot(address.root())?;

        // Any failure from here on drops the half-built store, releasing
        // the bucket without registering anything.
        let store = Arc::new(Store::new(
            address,
            manifest.kind,
            access,
            self.objects.clone(),
            self.keystore.clone(),
            self.config.key_id.clone(),
            self.identity,
            bucket,
        ));
        store.load().await?;

        let replicator = if options.replicate_or_default() {
            Some(Replicator::spawn(store.clone(), self.pubsub.clone(), self.config.settle_delay).await?)
        } else {
            None
        };

        info!(address = %key, kind = %store.kind(), "opened database");
        stores.insert(
            key,
            ActiveStore {
                store: store.clone(),
                replicator,
            },
        );
        Ok(store)
    }

    // ------------------------------------------------------------------
    // Convenience factories
    // ------------------------------------------------------------------

    /// Open (creating if needed) an event log.
    pub async fn eventlog(&self, reference: &str) -> Result<EventLog, DbError> {
        let store = self
            .open(reference, OpenOptions::create(StoreKind::EventLog))
            .await?;
        EventLog::new(store)
    }

    /// Open (creating if needed) a feed.
    pub async fn feed(&self, reference: &str) -> Result<Feed, DbError> {
        let store = self
            .open(reference, OpenOptions::create(StoreKind::Feed))
            .await?;
        Feed::new(store)
    }

    /// Open (creating if needed) a key/value store.
    pub async fn keyvalue(&self, reference: &str) -> Result<KeyValue, DbError> {
        let store = self
            .open(reference, OpenOptions::create(StoreKind::KeyValue))
            .await?;
        KeyValue::new(store)
    }

    /// Open (creating if needed) a counter.
    pub async fn counter(&self, reference: &str) -> Result<Counter, DbError> {
        let store = self
            .open(reference, OpenOptions::create(StoreKind::Counter))
            .await?;
        Counter::new(store)
    }

    /// Open (creating if needed) a document store.
    pub async fn docstore(&self, reference: &str) -> Result<DocStore, DbError> {
        let store = self
            .open(reference, OpenOptions::create(StoreKind::DocStore))
            .await?;
        DocStore::new(store)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Poll until at least `count` other peers are on the database's
    /// channel, or time out.
    pub async fn wait_for_peers(
        &self,
        address: &Address,
        count: usize,
        timeout: Duration,
    ) -> Result<(), DbError> {
        let channel = address.to_string();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.pubsub.peers(&channel).await?.len() >= count {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DbError::Timeout(channel));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Close one database: stop its replication, release its resources,
    /// and drop it from the active map.
    pub async fn close(&self, address: &Address) -> Result<(), DbError> {
        let active = self.stores.lock().await.remove(&address.to_string());

        if let Some(active) = active {
            if let Some(replicator) = active.replicator {
                replicator.stop().await;
            }
            active.store.close();
        }

        Ok(())
    }

    /// Close every active database and leave every channel.
    pub async fn disconnect(&self) -> Result<(), DbError> {
        let drained: Vec<ActiveStore> = {
            let mut stores = self.stores.lock().await;
            stores.drain().map(|(_, active)| active).collect()
        };

        for active in drained {
            if let Some(replicator) = active.replicator {
                replicator.stop().await;
            }
            active.store.close();
        }

        info!("database manager disconnected");
        Ok(())
    }
}
