//! Latest-write-wins document store.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use kelp_oplog::TraverseOptions;
use kelp_types::{ObjectId, StoreKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::check_kind;
use crate::error::DbError;
use crate::store::Store;

/// Default index field for document ids.
const DEFAULT_INDEX: &str = "_id";

/// Document operations carried in entry payloads. Documents travel as
/// JSON text — the index field has to be extractable at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum DocOp {
    /// Store or replace a document.
    Put { document: String },
    /// Remove a document by id.
    Del { id: String },
}

/// JSON documents keyed by a configured index field, latest write wins.
pub struct DocStore {
    store: Arc<Store>,
    index_by: String,
}

impl DocStore {
    /// Wrap a docstore-flavored store, indexing by `"_id"`.
    pub fn new(store: Arc<Store>) -> Result<Self, DbError> {
        Self::with_index(store, DEFAULT_INDEX)
    }

    /// Wrap a docstore-flavored store with a custom index field.
    pub fn with_index(store: Arc<Store>, index_by: impl Into<String>) -> Result<Self, DbError> {
        check_kind(&store, StoreKind::DocStore)?;
        Ok(Self {
            store,
            index_by: index_by.into(),
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The configured index field.
    pub fn index_by(&self) -> &str {
        &self.index_by
    }

    /// Extract the document id from the configured index field.
    fn document_id(&self, document: &Value) -> Result<String, DbError> {
        match document.get(&self.index_by) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(DbError::Document(format!(
                "index field {:?} must be a string or number",
                self.index_by
            ))),
            None => Err(DbError::Document(format!(
                "document is missing index field {:?}",
                self.index_by
            ))),
        }
    }

    async fn append_op(&self, op: &DocOp) -> Result<ObjectId, DbError> {
        let bytes = postcard::to_allocvec(op)
            .map_err(|e| kelp_store::StoreError::Serialization(e.to_string()))?;
        Ok(self.store.append(Bytes::from(bytes)).await?.hash)
    }

    /// Store a document; returns the new entry's hash.
    pub async fn put(&self, document: &Value) -> Result<ObjectId, DbError> {
        // Fails before touching the log when the id can't be extracted.
        self.document_id(document)?;
        self.append_op(&DocOp::Put {
            document: document.to_string(),
        })
        .await
    }

    /// Remove a document by id; returns the new entry's hash.
    pub async fn del(&self, id: impl Into<String>) -> Result<ObjectId, DbError> {
        self.append_op(&DocOp::Del { id: id.into() }).await
    }

    /// Materialize all live documents, keyed by id.
    pub async fn all(&self) -> Result<BTreeMap<String, Value>, DbError> {
        let entries = self.store.traverse(&TraverseOptions::default()).await?;
        let mut map: BTreeMap<String, Option<Value>> = BTreeMap::new();

        for entry in entries {
            match postcard::from_bytes::<DocOp>(&entry.payload) {
                Ok(DocOp::Put { document }) => {
                    let Ok(value) = serde_json::from_str::<Value>(&document) else {
                        warn!(hash = %entry.hash, "skipping unparsable document");
                        continue;
                    };
                    match self.document_id(&value) {
                        Ok(id) => {
                            map.insert(id, Some(value));
                        }
                        Err(e) => {
                            warn!(hash = %entry.hash, "skipping unindexable document: {e}");
                        }
                    }
                }
                Ok(DocOp::Del { id }) => {
                    map.insert(id, None);
                }
                Err(e) => {
                    warn!(hash = %entry.hash, "skipping undecodable document entry: {e}");
                }
            }
        }

        Ok(map
            .into_iter()
            .filter_map(|(id, value)| value.map(|v| (id, v)))
            .collect())
    }

    /// Look up a document by id.
    pub async fn get(&self, id: &str) -> Result<Option<Value>, DbError> {
        Ok(self.all().await?.remove(id))
    }

    /// All documents matching a predicate.
    pub async fn query(&self, predicate: impl Fn(&Value) -> bool) -> Result<Vec<Value>, DbError> {
        Ok(self
            .all()
            .await?
            .into_values()
            .filter(|v| predicate(v))
            .collect())
    }
}
