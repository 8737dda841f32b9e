/// Organisation invite tokens
///
/// An organisation hands a member a token allowing one address to be created
/// under the organisation without proof-of-work. The token is
/// `base64(addr_hash ":" routing_id ":" expiry ":" signature)` with the
/// signature made by the organisation key over `addr_hash + routing_id + expiry`.
/// The signature is raw bytes, so the decoded token is split on the first
/// three colons only.
use crate::{
    crypto::{PrivateKey, PublicKey},
    error::ResolverResult,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};

fn signed_part(addr_hash: &str, routing_id: &str, expiry: i64) -> String {
    format!("{}{}{}", addr_hash, routing_id, expiry)
}

/// Build a token valid until `expiry`
pub fn generate_invite_token(
    addr_hash: &str,
    routing_id: &str,
    expiry: DateTime<Utc>,
    key: &PrivateKey,
) -> ResolverResult<String> {
    let expiry = expiry.timestamp();
    let signature = key.sign(signed_part(addr_hash, routing_id, expiry).as_bytes())?;

    let mut raw = format!("{}:{}:{}:", addr_hash, routing_id, expiry).into_bytes();
    raw.extend_from_slice(&signature);

    Ok(STANDARD.encode(raw))
}

/// Verify a token for exactly this address and routing id at `now`.
///
/// Every failure is the same `false`.
pub fn verify_invite_token(
    token: &str,
    addr_hash: &str,
    routing_id: &str,
    key: &PublicKey,
    now: DateTime<Utc>,
) -> bool {
    let Ok(raw) = STANDARD.decode(token.trim()) else {
        return false;
    };

    let parts: Vec<&[u8]> = raw.splitn(4, |b| *b == b':').collect();
    let [addr, routing, expiry, signature] = parts.as_slice() else {
        return false;
    };

    let (Ok(addr), Ok(routing), Ok(expiry)) = (
        std::str::from_utf8(addr),
        std::str::from_utf8(routing),
        std::str::from_utf8(expiry),
    ) else {
        return false;
    };

    let Ok(expiry) = expiry.parse::<i64>() else {
        return false;
    };

    key.verify(signed_part(addr, routing, expiry).as_bytes(), signature)
        && addr == addr_hash
        && routing == routing_id
        && now.timestamp() <= expiry
}
