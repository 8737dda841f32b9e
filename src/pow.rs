/// Proof-of-work tokens and the admission gate for new records
///
/// A token claims `bits` leading zero bits in `SHA-256(data || proof)` where
/// `proof` is rendered in decimal. The gate checks the claim, that `data` is
/// the hash being registered, and that `bits` meets the policy minimum.
use crate::error::{ResolverError, ResolverResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const MAX_BITS: u32 = 256;

/// A mined (or claimed) proof-of-work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWork {
    pub bits: u32,
    pub data: String,
    pub proof: u64,
}

impl ProofOfWork {
    pub fn new(bits: u32, data: impl Into<String>, proof: u64) -> Self {
        Self {
            bits,
            data: data.into(),
            proof,
        }
    }

    /// Search for a proof of `bits` difficulty over `data`
    pub fn work(bits: u32, data: impl Into<String>) -> Self {
        let data = data.into();
        let bits = bits.min(MAX_BITS);
        let mut proof = 0u64;
        while leading_zero_bits(&digest(&data, proof)) < bits {
            proof = proof.wrapping_add(1);
        }
        Self { bits, data, proof }
    }

    /// True when the hash really has the claimed number of leading zero bits
    pub fn is_valid(&self) -> bool {
        self.bits <= MAX_BITS && leading_zero_bits(&digest(&self.data, self.proof)) >= self.bits
    }
}

fn digest(data: &str, proof: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hasher.update(proof.to_string().as_bytes());
    hasher.finalize().into()
}

fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for byte in bytes {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// `bits$data$proof`
impl fmt::Display for ProofOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}${}", self.bits, self.data, self.proof)
    }
}

impl FromStr for ProofOfWork {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('$').collect();
        if parts.len() != 3 {
            return Err(ResolverError::ProofOfWork("incorrect proof-of-work".into()));
        }
        let bits = parts[0]
            .parse()
            .map_err(|_| ResolverError::ProofOfWork("incorrect proof-of-work".into()))?;
        let proof = parts[2]
            .parse()
            .map_err(|_| ResolverError::ProofOfWork("incorrect proof-of-work".into()))?;
        Ok(ProofOfWork::new(bits, parts[1], proof))
    }
}

/// Two-layer check: token self-consistency, then policy minimum
#[derive(Debug, Clone, Copy)]
pub struct ProofOfWorkGate {
    pub min_bits: u32,
}

impl ProofOfWorkGate {
    pub fn new(min_bits: u32) -> Self {
        Self { min_bits }
    }

    pub fn check(&self, token: Option<&ProofOfWork>, target: &str) -> ResolverResult<()> {
        let token = token.ok_or_else(|| ResolverError::ProofOfWork("incorrect proof-of-work".into()))?;

        if token.data != target || !token.is_valid() {
            return Err(ResolverError::ProofOfWork("incorrect proof-of-work".into()));
        }

        if token.bits < self.min_bits {
            return Err(ResolverError::ProofOfWork(format!(
                "proof-of-work too weak (need {} bits)",
                self.min_bits
            )));
        }

        Ok(())
    }
}
