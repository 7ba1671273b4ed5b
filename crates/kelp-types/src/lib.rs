//! Shared types and identifiers for Kelp.
//!
//! This crate defines the core types used across the Kelp workspace:
//! content addresses ([`ObjectId`]), author identities ([`ReplicaId`]),
//! the logical clock carried by log entries ([`LamportClock`]), the five
//! database flavors ([`StoreKind`]), database addresses ([`Address`]),
//! and the open/create option structs.

mod address;
mod options;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use address::{ADDRESS_SCHEME, Address, AddressError};
pub use options::{CreateOptions, OpenOptions, Writer};

// ---------------------------------------------------------------------------
// Content addresses
// ---------------------------------------------------------------------------

/// Content address of a stored object: `blake3(bytes)`.
///
/// Entries, manifests, and access-controller lists are all addressed by
/// their canonical encoding's blake3 hash, so one id type covers them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Create an id by hashing arbitrary data with BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

// ---------------------------------------------------------------------------
// Replica identity
// ---------------------------------------------------------------------------

/// Identity of a log author: the 32 bytes of an ed25519 public key.
///
/// Kept as raw bytes so it can travel through serde and be ordered; the
/// [`VerifyingKey`](ed25519_dalek::VerifyingKey) is reconstructed on demand
/// when a signature has to be checked.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReplicaId([u8; 32]);

impl ReplicaId {
    /// Return the raw 32-byte public key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify an ed25519 signature over `msg`.
    ///
    /// Reconstructs the verifying key from the id bytes. Returns `false`
    /// if the bytes are not a valid public key or the signature does not
    /// match.
    pub fn verify(&self, msg: &[u8], signature: &ed25519_dalek::Signature) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        use ed25519_dalek::Verifier;
        key.verify(msg, signature).is_ok()
    }
}

impl From<[u8; 32]> for ReplicaId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ed25519_dalek::VerifyingKey> for ReplicaId {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl AsRef<[u8]> for ReplicaId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({self})")
    }
}

// ---------------------------------------------------------------------------
// Lamport clock
// ---------------------------------------------------------------------------

/// Lamport-style logical clock carried by every log entry.
///
/// `time` is strictly greater than the time of every causal parent; `id`
/// is the author's identity. The derived total order `(time, id)` is used
/// only as a deterministic tie-break when causal order says nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    /// Author identity.
    pub id: ReplicaId,
    /// Logical timestamp, `>= 1` for every real entry.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock for the given author and time.
    pub fn new(id: ReplicaId, time: u64) -> Self {
        Self { id, time }
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.cmp(&other.time).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Store kinds
// ---------------------------------------------------------------------------

/// The five database flavors, all interpretations of the same log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    /// Append-only log enumerated in causal order.
    EventLog,
    /// Like [`StoreKind::EventLog`] but entries can be tombstoned.
    Feed,
    /// Latest-write-wins key/value projection.
    KeyValue,
    /// Grow-only counter summed over per-identity maxima.
    Counter,
    /// Latest-write-wins document store keyed by an index field.
    DocStore,
}

impl StoreKind {
    /// All valid kinds, in canonical order.
    pub const ALL: [StoreKind; 5] = [
        StoreKind::EventLog,
        StoreKind::Feed,
        StoreKind::KeyValue,
        StoreKind::Counter,
        StoreKind::DocStore,
    ];

    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::EventLog => "eventlog",
            StoreKind::Feed => "feed",
            StoreKind::KeyValue => "keyvalue",
            StoreKind::Counter => "counter",
            StoreKind::DocStore => "docstore",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A database kind name outside the valid set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid database kind: {0:?}")]
pub struct KindParseError(pub String);

impl std::str::FromStr for StoreKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eventlog" => Ok(StoreKind::EventLog),
            "feed" => Ok(StoreKind::Feed),
            "keyvalue" => Ok(StoreKind::KeyValue),
            "counter" => Ok(StoreKind::Counter),
            "docstore" => Ok(StoreKind::DocStore),
            other => Err(KindParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_from_data_deterministic() {
        let id1 = ObjectId::from_data(b"hello world");
        let id2 = ObjectId::from_data(b"hello world");
        assert_eq!(id1, id2, "same data must produce the same ObjectId");
    }

    #[test]
    fn test_object_id_different_data_different_id() {
        assert_ne!(ObjectId::from_data(b"a"), ObjectId::from_data(b"b"));
    }

    #[test]
    fn test_object_id_display_is_hex() {
        let id = ObjectId::from([
            0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71, 0x82, 0x93, 0xa4, 0xb5, 0xc6, 0xd7,
            0xe8, 0xf9, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
            0xcc, 0xdd, 0xee, 0xff,
        ]);
        let hex = id.to_string();
        assert_eq!(
            hex,
            "0a1b2c3d4e5f60718293a4b5c6d7e8f900112233445566778899aabbccddeeff"
        );
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn test_object_id_roundtrip_postcard() {
        let id = ObjectId::from_data(b"content");
        let encoded = postcard::to_allocvec(&id).unwrap();
        let decoded: ObjectId = postcard::from_bytes(&encoded).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn test_replica_id_verify_rejects_garbage_key() {
        // Not a valid ed25519 point — verify must return false, not panic.
        let id = ReplicaId::from([0xff; 32]);
        let sig = ed25519_dalek::Signature::from_bytes(&[0u8; 64]);
        assert!(!id.verify(b"message", &sig));
    }

    #[test]
    fn test_replica_id_verify_real_signature() {
        use ed25519_dalek::Signer;
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let id = ReplicaId::from(key.verifying_key());
        let sig = key.sign(b"payload");
        assert!(id.verify(b"payload", &sig));
        assert!(!id.verify(b"tampered", &sig));
    }

    #[test]
    fn test_lamport_clock_orders_by_time_then_id() {
        let low = LamportClock::new(ReplicaId::from([9u8; 32]), 1);
        let high = LamportClock::new(ReplicaId::from([0u8; 32]), 2);
        assert!(low < high, "time dominates the order");

        let a = LamportClock::new(ReplicaId::from([1u8; 32]), 5);
        let b = LamportClock::new(ReplicaId::from([2u8; 32]), 5);
        assert!(a < b, "id breaks ties");
    }

    #[test]
    fn test_store_kind_roundtrip_names() {
        for kind in StoreKind::ALL {
            let parsed: StoreKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_store_kind_rejects_unknown_name() {
        assert!("sql".parse::<StoreKind>().is_err());
        assert!("".parse::<StoreKind>().is_err());
        assert!("EventLog".parse::<StoreKind>().is_err(), "names are lowercase");
    }

    #[test]
    fn test_store_kind_roundtrip_postcard() {
        for kind in StoreKind::ALL {
            let encoded = postcard::to_allocvec(&kind).unwrap();
            let decoded: StoreKind = postcard::from_bytes(&encoded).unwrap();
            assert_eq!(kind, decoded);
        }
    }
}
