//! Wire message for head gossip.

use bytes::Bytes;
use kelp_types::ObjectId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PubSubError;

/// A head-set announcement for one database.
///
/// The nonce guarantees byte-level uniqueness so that a broadcast layer
/// deduplicating by content (as plumtree-style gossip does) never drops a
/// deliberate re-announcement of the same heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadsAnnounce {
    /// Canonical address of the database the heads belong to.
    pub address: String,
    /// The announcing peer's current head set.
    pub heads: Vec<ObjectId>,
    /// Random nonce for byte-level uniqueness.
    pub nonce: u64,
}

impl HeadsAnnounce {
    /// Build an announcement with a fresh nonce.
    pub fn new(address: impl Into<String>, heads: Vec<ObjectId>) -> Self {
        Self {
            address: address.into(),
            heads,
            nonce: rand::rng().random(),
        }
    }

    /// Postcard-encode for the wire.
    pub fn encode(&self) -> Result<Bytes, PubSubError> {
        Ok(Bytes::from(postcard::to_allocvec(self)?))
    }

    /// Decode from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, PubSubError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_roundtrip() {
        let announce = HeadsAnnounce::new(
            "/kelp/00/db",
            vec![ObjectId::from_data(b"h1"), ObjectId::from_data(b"h2")],
        );

        let decoded = HeadsAnnounce::decode(&announce.encode().unwrap()).unwrap();
        assert_eq!(decoded, announce);
    }

    #[test]
    fn test_same_heads_encode_differently() {
        let heads = vec![ObjectId::from_data(b"h")];
        let a = HeadsAnnounce::new("/kelp/00/db", heads.clone());
        let b = HeadsAnnounce::new("/kelp/00/db", heads);
        // Nonces differ, so re-announcements survive content dedup.
        assert_ne!(a.encode().unwrap(), b.encode().unwrap());
    }
}
