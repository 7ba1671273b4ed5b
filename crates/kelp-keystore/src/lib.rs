//! Signing-key management for Kelp.
//!
//! A [`Keystore`] holds named ed25519 signing keys. Every database author
//! is identified by the public half of such a key ([`ReplicaId`]); entries
//! are signed with the private half. Keys live either in memory or in a
//! fjall keyspace on disk.

mod error;

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use ed25519_dalek::{Signature, Signer, SigningKey};
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use kelp_types::ReplicaId;
use rand::RngCore;
use tracing::debug;

pub use error::KeystoreError;

fn storage_err(e: impl std::fmt::Display) -> KeystoreError {
    KeystoreError::Storage(e.to_string())
}

/// Inner backend: fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        keys: Keyspace,
    },
    Memory(RwLock<HashMap<String, [u8; 32]>>),
}

/// Named ed25519 signing keys.
pub struct Keystore {
    backend: Backend,
}

impl Keystore {
    /// Open a persistent keystore at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeystoreError> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        let keys = db
            .keyspace("keys", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        Ok(Self {
            backend: Backend::Fjall { db, keys },
        })
    }

    /// Create a volatile in-memory keystore.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    fn get_secret(&self, id: &str) -> Result<Option<[u8; 32]>, KeystoreError> {
        match &self.backend {
            Backend::Fjall { keys, .. } => {
                let value = keys.get(id.as_bytes()).map_err(storage_err)?;
                match value {
                    Some(v) => {
                        let secret: [u8; 32] = v
                            .as_ref()
                            .try_into()
                            .map_err(|_| KeystoreError::Storage("corrupt key record".into()))?;
                        Ok(Some(secret))
                    }
                    None => Ok(None),
                }
            }
            Backend::Memory(m) => Ok(m.read().expect("lock poisoned").get(id).copied()),
        }
    }

    fn put_secret(&self, id: &str, secret: [u8; 32]) -> Result<(), KeystoreError> {
        match &self.backend {
            Backend::Fjall { keys, .. } => {
                keys.insert(id.as_bytes(), secret).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.write().expect("lock poisoned").insert(id.to_string(), secret);
            }
        }
        Ok(())
    }

    /// Whether a key with this id exists.
    pub fn has_key(&self, id: &str) -> Result<bool, KeystoreError> {
        Ok(self.get_secret(id)?.is_some())
    }

    /// Generate and store a new key under `id`.
    ///
    /// Fails with [`KeystoreError::KeyExists`] if the id is taken — keys
    /// are never silently replaced.
    pub fn create_key(&self, id: &str) -> Result<ReplicaId, KeystoreError> {
        if self.has_key(id)? {
            return Err(KeystoreError::KeyExists(id.to_string()));
        }

        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        self.put_secret(id, secret)?;

        let key = SigningKey::from_bytes(&secret);
        let replica = ReplicaId::from(key.verifying_key());
        debug!(key_id = id, identity = %replica, "created signing key");
        Ok(replica)
    }

    /// Load the signing key stored under `id`.
    pub fn get_key(&self, id: &str) -> Result<Option<SigningKey>, KeystoreError> {
        Ok(self.get_secret(id)?.map(|s| SigningKey::from_bytes(&s)))
    }

    /// The public identity of the key stored under `id`.
    pub fn public_key(&self, id: &str) -> Result<Option<ReplicaId>, KeystoreError> {
        Ok(self
            .get_key(id)?
            .map(|k| ReplicaId::from(k.verifying_key())))
    }

    /// Sign `bytes` with the key stored under `id`.
    pub fn sign(&self, id: &str, bytes: &[u8]) -> Result<Signature, KeystoreError> {
        let key = self
            .get_key(id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(id.to_string()))?;
        Ok(key.sign(bytes))
    }

    /// Verify a signature against a public identity.
    pub fn verify(replica: &ReplicaId, bytes: &[u8], signature: &Signature) -> bool {
        replica.verify(bytes, signature)
    }
}
