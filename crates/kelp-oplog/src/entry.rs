//! Log entries: signed, content-addressed, parent-linked records.

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey};
use kelp_types::{LamportClock, ObjectId, ReplicaId};
use serde::{Deserialize, Serialize};

use crate::error::OplogError;

/// A single entry in the operation log.
///
/// The payload is opaque at this layer; the typed store adapters decide
/// what it means. `parents` (kept sorted) are the DAG edges to the heads
/// observed at append time. The hash is derived from the canonical wire
/// encoding and is never serialized itself, so tampering with any field
/// invalidates either the hash or the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque, type-specific payload bytes.
    pub payload: Bytes,
    /// Hashes of the causal parent entries, sorted.
    pub parents: Vec<ObjectId>,
    /// Lamport clock: author identity plus logical time.
    pub clock: LamportClock,
    /// Public key of the author.
    pub identity: ReplicaId,
    /// ed25519 signature over the signed encoding, split into two 32-byte
    /// halves for serde compatibility (serde doesn't derive for `[u8; 64]`
    /// out of the box).
    pub signature_r: [u8; 32],
    pub signature_s: [u8; 32],
    /// blake3 hash of the canonical wire encoding — the entry's address.
    pub hash: ObjectId,
}

/// Signed portion of an entry: everything except the signature and hash,
/// in fixed field order.
#[derive(Serialize)]
struct SignedContent<'a> {
    payload: &'a Bytes,
    parents: &'a Vec<ObjectId>,
    clock: &'a LamportClock,
    identity: &'a ReplicaId,
}

/// Canonical wire form: the signed fields plus the signature. The hash is
/// excluded — it is recomputed from these bytes on decode.
#[derive(Serialize, Deserialize)]
struct WireEntry {
    payload: Bytes,
    parents: Vec<ObjectId>,
    clock: LamportClock,
    identity: ReplicaId,
    signature_r: [u8; 32],
    signature_s: [u8; 32],
}

fn signed_bytes(
    payload: &Bytes,
    parents: &Vec<ObjectId>,
    clock: &LamportClock,
    identity: &ReplicaId,
) -> Vec<u8> {
    let content = SignedContent {
        payload,
        parents,
        clock,
        identity,
    };
    postcard::to_allocvec(&content).expect("serialization should not fail")
}

impl Entry {
    /// Create a new signed entry.
    ///
    /// Sorts the parents, signs the canonical encoding of the fields, then
    /// derives the hash over fields plus signature.
    pub fn create(
        payload: Bytes,
        mut parents: Vec<ObjectId>,
        clock: LamportClock,
        signing_key: &SigningKey,
    ) -> Self {
        parents.sort();
        parents.dedup();

        let identity = ReplicaId::from(signing_key.verifying_key());
        let signature = signing_key.sign(&signed_bytes(&payload, &parents, &clock, &identity));
        let sig_bytes = signature.to_bytes();

        let mut signature_r = [0u8; 32];
        let mut signature_s = [0u8; 32];
        signature_r.copy_from_slice(&sig_bytes[..32]);
        signature_s.copy_from_slice(&sig_bytes[32..]);

        let wire = WireEntry {
            payload,
            parents,
            clock,
            identity,
            signature_r,
            signature_s,
        };
        let bytes = postcard::to_allocvec(&wire).expect("serialization should not fail");
        let hash = ObjectId::from_data(&bytes);

        Self {
            payload: wire.payload,
            parents: wire.parents,
            clock: wire.clock,
            identity: wire.identity,
            signature_r,
            signature_s,
            hash,
        }
    }

    /// Canonical wire encoding. Storing these bytes in the object store
    /// yields the entry's own hash as its address.
    pub fn to_bytes(&self) -> Result<Bytes, OplogError> {
        let wire = WireEntry {
            payload: self.payload.clone(),
            parents: self.parents.clone(),
            clock: self.clock,
            identity: self.identity,
            signature_r: self.signature_r,
            signature_s: self.signature_s,
        };
        Ok(Bytes::from(postcard::to_allocvec(&wire)?))
    }

    /// Decode an entry from its canonical wire encoding, recomputing the
    /// hash from the bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OplogError> {
        let wire: WireEntry = postcard::from_bytes(bytes)?;
        let hash = ObjectId::from_data(bytes);

        Ok(Self {
            payload: wire.payload,
            parents: wire.parents,
            clock: wire.clock,
            identity: wire.identity,
            signature_r: wire.signature_r,
            signature_s: wire.signature_s,
            hash,
        })
    }

    /// Reconstruct the 64-byte signature from its two halves.
    pub fn signature(&self) -> Signature {
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.signature_r);
        sig[32..].copy_from_slice(&self.signature_s);
        Signature::from_bytes(&sig)
    }

    /// Verify that the stored hash matches the canonical encoding.
    pub fn verify_hash(&self) -> bool {
        match self.to_bytes() {
            Ok(bytes) => ObjectId::from_data(&bytes) == self.hash,
            Err(_) => false,
        }
    }

    /// Verify the ed25519 signature against the author identity.
    pub fn verify_signature(&self) -> bool {
        let bytes = signed_bytes(&self.payload, &self.parents, &self.clock, &self.identity);
        self.identity.verify(&bytes, &self.signature())
    }

    /// The linearization key: `(clock.time, clock.id, hash)`.
    ///
    /// Total, deterministic, and consistent with causal order because an
    /// entry's time is strictly greater than all of its parents'.
    pub fn sort_key(&self) -> (u64, ReplicaId, ObjectId) {
        (self.clock.time, self.clock.id, self.hash)
    }
}
