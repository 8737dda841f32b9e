/// Hash identifiers for addresses, routing endpoints and organisations
///
/// Every record is keyed by a lowercase hex SHA-256 digest. Addresses of the
/// form `local@org!` hash in two steps: the local part and the organisation
/// are hashed separately, and the address hash is the digest of the two hex
/// strings concatenated. That lets an organisation prove an address belongs to
/// it without revealing the local part.
use crate::error::{ResolverError, ResolverResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Hex digest of the empty string, treated as "no organisation"
const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// 64-character lowercase hex SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(String);

impl Hash {
    /// Hash arbitrary input
    pub fn new(data: impl AsRef<[u8]>) -> Self {
        Hash(hex::encode(Sha256::digest(data.as_ref())))
    }

    /// Parse an existing digest, accepting upper-case hex
    pub fn parse(s: &str) -> ResolverResult<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if is_hex_digest(&lower) {
            Ok(Hash(lower))
        } else {
            Err(ResolverError::validation("invalid hash"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this hash is `H(local || org)`
    pub fn verify(&self, local: &str, org: &str) -> bool {
        let expected = Hash::new(format!("{}{}", local, org));
        self.0 == expected.0
    }

    /// True for the empty string digest, which stands in for "no organisation"
    pub fn is_empty_org(&self) -> bool {
        self.0 == EMPTY_DIGEST
    }
}

/// True when `s` is exactly 64 lowercase hex characters
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// True when an organisation hash string means "not an organisation address"
pub fn is_empty_org_hash(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case(EMPTY_DIGEST)
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::parse(s)
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A human address such as `jay@acme!` or `jay!`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashAddress {
    pub local: String,
    pub org: String,
}

impl HashAddress {
    pub fn parse(address: &str) -> ResolverResult<Self> {
        let trimmed = address.trim().trim_end_matches('!').to_lowercase();
        let (local, org) = match trimmed.split_once('@') {
            Some((local, org)) => (local.to_string(), org.to_string()),
            None => (trimmed, String::new()),
        };

        if local.is_empty() || local.contains('@') || org.contains('@') {
            return Err(ResolverError::validation("invalid address"));
        }

        Ok(Self { local, org })
    }

    pub fn local_hash(&self) -> Hash {
        Hash::new(&self.local)
    }

    pub fn org_hash(&self) -> Hash {
        Hash::new(&self.org)
    }

    /// `H(H(local) || H(org))`
    pub fn hash(&self) -> Hash {
        Hash::new(format!("{}{}", self.local_hash(), self.org_hash()))
    }

    pub fn has_organisation(&self) -> bool {
        !self.org.is_empty()
    }
}
