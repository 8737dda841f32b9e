/// Key material and signatures
///
/// Records bind ed25519 or secp256k1 public keys. Every signature in the
/// resolver is computed over the SHA-256 digest of a canonical message.
pub mod keys;

pub use keys::{KeyType, PrivateKey, PublicKey};
