/// Public and private keys in their `"<type> <base64>"` text form
use crate::error::{ResolverError, ResolverResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use k256::ecdsa::signature::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ed25519,
    Secp256k1,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::Secp256k1 => "secp256k1",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyType::Ed25519),
            "secp256k1" => Ok(KeyType::Secp256k1),
            _ => Err(ResolverError::validation("unsupported key type")),
        }
    }
}

fn split_encoded(s: &str) -> ResolverResult<(KeyType, Vec<u8>)> {
    let (kind, data) = s
        .trim()
        .split_once(' ')
        .ok_or_else(|| ResolverError::validation("invalid key format"))?;
    let key_type = kind.parse()?;
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|_| ResolverError::validation("invalid key encoding"))?;
    Ok((key_type, bytes))
}

/// A public key bound to a record
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    key_type: KeyType,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Build from raw bytes, checking they form a valid point
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> ResolverResult<Self> {
        let valid = match key_type {
            KeyType::Ed25519 => <[u8; 32]>::try_from(bytes)
                .ok()
                .and_then(|raw| ed25519_dalek::VerifyingKey::from_bytes(&raw).ok())
                .is_some(),
            KeyType::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes).is_ok(),
        };

        if !valid {
            return Err(ResolverError::validation("invalid public key"));
        }

        Ok(Self {
            key_type,
            bytes: bytes.to_vec(),
        })
    }

    pub fn parse(s: &str) -> ResolverResult<Self> {
        let (key_type, bytes) = split_encoded(s)?;
        Self::from_bytes(key_type, &bytes)
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of the raw key bytes
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Verify `signature` over `SHA-256(message)`. Any malformed input is a plain `false`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let digest = Sha256::digest(message);

        match self.key_type {
            KeyType::Ed25519 => {
                let Ok(raw) = <[u8; 32]>::try_from(self.bytes.as_slice()) else {
                    return false;
                };
                let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&raw) else {
                    return false;
                };
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_strict(&digest, &sig).is_ok()
            }
            KeyType::Secp256k1 => {
                let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.bytes) else {
                    return false;
                };
                let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(&digest, &sig).is_ok()
            }
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key_type, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::parse(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A private key. Held by clients and tests; the resolver itself never stores one.
#[derive(Clone)]
pub struct PrivateKey {
    key_type: KeyType,
    secret: [u8; 32],
}

impl PrivateKey {
    /// Generate a fresh key from the OS random source
    pub fn generate(key_type: KeyType) -> Self {
        let secret = match key_type {
            KeyType::Ed25519 => ed25519_dalek::SigningKey::generate(&mut OsRng).to_bytes(),
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::random(&mut OsRng).to_bytes().into(),
        };
        Self { key_type, secret }
    }

    /// Build from a 32-byte seed (ed25519) or scalar (secp256k1)
    pub fn from_seed(key_type: KeyType, seed: [u8; 32]) -> ResolverResult<Self> {
        if key_type == KeyType::Secp256k1 && k256::ecdsa::SigningKey::from_slice(&seed).is_err() {
            return Err(ResolverError::validation("invalid private key"));
        }
        Ok(Self {
            key_type,
            secret: seed,
        })
    }

    pub fn parse(s: &str) -> ResolverResult<Self> {
        let (key_type, bytes) = split_encoded(s)?;
        let seed = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| ResolverError::validation("invalid private key"))?;
        Self::from_seed(key_type, seed)
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn public_key(&self) -> ResolverResult<PublicKey> {
        let bytes = match self.key_type {
            KeyType::Ed25519 => ed25519_dalek::SigningKey::from_bytes(&self.secret)
                .verifying_key()
                .to_bytes()
                .to_vec(),
            KeyType::Secp256k1 => self
                .secp256k1()?
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        };
        PublicKey::from_bytes(self.key_type, &bytes)
    }

    /// Sign `SHA-256(message)`
    pub fn sign(&self, message: &[u8]) -> ResolverResult<Vec<u8>> {
        let digest = Sha256::digest(message);

        match self.key_type {
            KeyType::Ed25519 => {
                let key = ed25519_dalek::SigningKey::from_bytes(&self.secret);
                let signature: ed25519_dalek::Signature = key.sign(&digest);
                Ok(signature.to_bytes().to_vec())
            }
            KeyType::Secp256k1 => {
                let signature: k256::ecdsa::Signature = self.secp256k1()?.sign(&digest);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    fn secp256k1(&self) -> ResolverResult<k256::ecdsa::SigningKey> {
        k256::ecdsa::SigningKey::from_slice(&self.secret)
            .map_err(|e| ResolverError::Internal(format!("invalid secp256k1 key: {}", e)))
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key_type, STANDARD.encode(self.secret))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, <redacted>)", self.key_type)
    }
}
