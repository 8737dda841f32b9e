/// Bearer-signature authentication
///
/// A mutation on an existing record carries `Authorization: BEARER <base64>`
/// where the payload is a signature, made with the record's key, over the
/// SHA-256 of a canonical message. The message embeds the record's current
/// serial so a signature is only good for one write.
use crate::{
    crypto::{PrivateKey, PublicKey},
    error::{ResolverError, ResolverResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::convert::Infallible;
use tracing::debug;

const SCHEME: &str = "bearer ";

/// Message signed for address writes: `hash + routing_id + serial`
pub fn address_message(hash: &str, routing_id: &str, serial: u64) -> String {
    format!("{}{}{}", hash, routing_id, serial)
}

/// Message signed for a key status change. The fingerprint and new status
/// are part of it so the header cannot be reused for any other write.
pub fn key_status_message(hash: &str, routing_id: &str, serial: u64, fingerprint: &str, status: &str) -> String {
    format!("{}{}{}{}{}", hash, routing_id, serial, fingerprint, status)
}

/// Message signed for routing and organisation writes, and for an
/// organisation removing one of its addresses: `hash + serial`
pub fn hash_serial_message(hash: &str, serial: u64) -> String {
    format!("{}{}", hash, serial)
}

/// Produce the base64 token (without scheme) for `message`
pub fn generate_authentication_token(message: &[u8], key: &PrivateKey) -> ResolverResult<String> {
    Ok(STANDARD.encode(key.sign(message)?))
}

/// Full header value for `message`
pub fn authorization_header(message: &[u8], key: &PrivateKey) -> ResolverResult<String> {
    Ok(format!("BEARER {}", generate_authentication_token(message, key)?))
}

/// Check an `Authorization` header value against `key` and `message`.
///
/// Fails closed: a missing header, another scheme, bad base64 and a wrong
/// signature are all indistinguishable `false`.
pub fn validate_authentication_token(header: Option<&str>, key: &PublicKey, message: &[u8]) -> bool {
    let Some(header) = header else {
        return false;
    };

    let header = header.trim();
    if header.len() <= SCHEME.len() || !header.is_char_boundary(SCHEME.len()) {
        return false;
    }
    let (scheme, token) = header.split_at(SCHEME.len());
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return false;
    }

    let Ok(signature) = STANDARD.decode(token.trim()) else {
        return false;
    };

    let ok = key.verify(message, &signature);
    if !ok {
        debug!("bearer signature rejected for key {}", key.fingerprint());
    }
    ok
}

/// Same as [`validate_authentication_token`] but as an engine error
pub fn require_signature(header: Option<&str>, key: &PublicKey, message: &str) -> ResolverResult<()> {
    if validate_authentication_token(header, key, message.as_bytes()) {
        Ok(())
    } else {
        Err(ResolverError::Authentication)
    }
}

/// Raw `Authorization` header, if any. Validation happens in the engine once
/// the stored key and serial are known.
#[derive(Debug, Clone, Default)]
pub struct BearerHeader(pub Option<String>);

impl BearerHeader {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        Ok(BearerHeader(value))
    }
}
