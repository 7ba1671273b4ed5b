//! Database addresses.
//!
//! A database is addressed by the pair (manifest hash, name), rendered as
//! the canonical path `/kelp/<root-hex>/<name>`. The root is the content
//! address of the database's manifest, so the address pins the database's
//! full identity: name, kind, and access controller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ObjectId;

/// The fixed scheme marker of a Kelp address.
pub const ADDRESS_SCHEME: &str = "kelp";

/// Canonical identifier of a database: manifest hash plus name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    root: ObjectId,
    path: String,
}

/// A string that does not parse as a database address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid database address: {0:?}")]
pub struct AddressError(pub String);

impl Address {
    /// Build an address from a manifest hash and a database name.
    pub fn new(root: ObjectId, path: impl Into<String>) -> Self {
        Self {
            root,
            path: path.into(),
        }
    }

    /// The manifest hash — the database's root identity.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// The database name.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether `s` parses as a canonical address.
    pub fn is_address(s: &str) -> bool {
        s.parse::<Address>().is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{ADDRESS_SCHEME}/{}/{}", self.root, self.path)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Strict parse: a leading slash, the literal scheme marker, and exactly
    /// three non-empty slash-separated segments, the first of which is a
    /// 64-character hex content address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError(s.to_string());

        let rest = s.strip_prefix('/').ok_or_else(invalid)?;
        let mut segments = rest.split('/');

        let scheme = segments.next().ok_or_else(invalid)?;
        if scheme != ADDRESS_SCHEME {
            return Err(invalid());
        }

        let root_hex = segments.next().ok_or_else(invalid)?;
        let name = segments.next().ok_or_else(invalid)?;
        if segments.next().is_some() || root_hex.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        let root = parse_hex_32(root_hex).ok_or_else(invalid)?;

        Ok(Address {
            root: ObjectId::from(root),
            path: name.to_string(),
        })
    }
}

/// Decode exactly 64 lowercase/uppercase hex characters into 32 bytes.
fn parse_hex_32(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 {
        return None;
    }

    let mut out = [0u8; 32];
    let bytes = s.as_bytes();

    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = ((hi << 4) | lo) as u8;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root() -> ObjectId {
        ObjectId::from_data(b"manifest bytes")
    }

    #[test]
    fn test_address_roundtrip_display_parse() {
        let addr = Address::new(test_root(), "my-log");
        let rendered = addr.to_string();
        assert!(rendered.starts_with("/kelp/"));

        let parsed: Address = rendered.parse().unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(parsed.root(), test_root());
        assert_eq!(parsed.path(), "my-log");
    }

    #[test]
    fn test_is_address() {
        let addr = Address::new(test_root(), "db").to_string();
        assert!(Address::is_address(&addr));
        assert!(!Address::is_address("db"));
        assert!(!Address::is_address("/kelp/nothex/db"));
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        let root = test_root();
        assert!(format!("/orbit/{root}/db").parse::<Address>().is_err());
        assert!(format!("{root}/db").parse::<Address>().is_err());
        assert!(format!("kelp/{root}/db").parse::<Address>().is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        let root = test_root();
        assert!("/kelp".parse::<Address>().is_err());
        assert!(format!("/kelp/{root}").parse::<Address>().is_err());
        assert!(format!("/kelp/{root}/a/b").parse::<Address>().is_err());
        assert!(format!("/kelp/{root}/").parse::<Address>().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_root() {
        assert!("/kelp/abc123/db".parse::<Address>().is_err(), "short root");
        let not_hex = "zz".repeat(32);
        assert!(format!("/kelp/{not_hex}/db").parse::<Address>().is_err());
    }

    #[test]
    fn test_parse_accepts_uppercase_hex() {
        let upper = test_root().to_string().to_uppercase();
        let parsed: Address = format!("/kelp/{upper}/db").parse().unwrap();
        assert_eq!(parsed.root(), test_root());
    }
}
