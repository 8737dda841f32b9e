/// Organisation name reservations
///
/// Some organisation hashes are reserved for the owners of real-world domains.
/// Such an organisation can only be registered by whoever controls one of the
/// domains, proven by a `_keyresolver.<domain>` TXT record holding the
/// fingerprint of the key being registered.
use crate::{
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

pub const TXT_PREFIX: &str = "_keyresolver.";

#[async_trait]
pub trait ReservationService: Send + Sync {
    /// Domains reserved for `org_hash`; empty when it is not reserved
    async fn get_domains(&self, org_hash: &str) -> ResolverResult<Vec<String>>;

    /// TXT values at `name`
    async fn lookup_txt(&self, name: &str) -> ResolverResult<Vec<String>>;

    /// True when `org_hash` is unreserved, or one of its domains publishes the
    /// fingerprint of `key`
    async fn is_validated(&self, org_hash: &str, key: &PublicKey) -> ResolverResult<bool> {
        let domains = self.get_domains(org_hash).await?;
        if domains.is_empty() {
            return Ok(true);
        }

        let fingerprint = key.fingerprint();
        for domain in domains {
            let name = format!("{}{}", TXT_PREFIX, domain);
            let values = self.lookup_txt(&name).await?;
            if values.iter().any(|v| v.trim() == fingerprint) {
                debug!("reservation for {} proven through {}", org_hash, name);
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Fixed reservations, used when the remote check is disabled and in tests
#[derive(Debug, Default, Clone)]
pub struct StaticReservationService {
    domains: HashMap<String, Vec<String>>,
    txt: HashMap<String, Vec<String>>,
}

impl StaticReservationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reservation(mut self, org_hash: &str, domains: &[&str]) -> Self {
        self.domains
            .insert(org_hash.to_string(), domains.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn with_txt(mut self, name: &str, value: &str) -> Self {
        self.txt.entry(name.to_string()).or_default().push(value.to_string());
        self
    }
}

#[async_trait]
impl ReservationService for StaticReservationService {
    async fn get_domains(&self, org_hash: &str) -> ResolverResult<Vec<String>> {
        Ok(self.domains.get(org_hash).cloned().unwrap_or_default())
    }

    async fn lookup_txt(&self, name: &str) -> ResolverResult<Vec<String>> {
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct DnsJsonResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsJsonAnswer>,
}

#[derive(Debug, Deserialize)]
struct DnsJsonAnswer {
    #[serde(rename = "type", default)]
    record_type: u16,
    #[serde(default)]
    data: String,
}

const DNS_TYPE_TXT: u16 = 16;

/// Extract TXT strings from a DNS JSON answer, joining split character-strings
pub(crate) fn parse_txt_answer(body: &str) -> ResolverResult<Vec<String>> {
    let response: DnsJsonResponse = serde_json::from_str(body)
        .map_err(|e| ResolverError::Internal(format!("invalid DNS response: {}", e)))?;

    Ok(response
        .answer
        .into_iter()
        .filter(|a| a.record_type == DNS_TYPE_TXT)
        .map(|a| a.data.split('"').enumerate().filter(|(i, _)| i % 2 == 1).map(|(_, s)| s).collect::<String>())
        .collect())
}

/// Reservation list over HTTP, TXT records over DNS-over-HTTPS
pub struct RemoteReservationService {
    client: reqwest::Client,
    base_url: String,
    doh_url: String,
}

impl RemoteReservationService {
    pub fn new(base_url: &str, doh_url: &str) -> ResolverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ResolverError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        info!("Reservation checks enabled against {}", base_url);

        Ok(Self {
            client,
            base_url: if base_url.ends_with('/') { base_url.to_string() } else { format!("{}/", base_url) },
            doh_url: doh_url.to_string(),
        })
    }
}

#[async_trait]
impl ReservationService for RemoteReservationService {
    async fn get_domains(&self, org_hash: &str) -> ResolverResult<Vec<String>> {
        let url = format!("{}{}", self.base_url, org_hash);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Reservation lookup failed for {}: {}", org_hash, e);
            ResolverError::Internal(format!("reservation lookup failed: {}", e))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let response = response
            .error_for_status()
            .map_err(|e| ResolverError::Internal(format!("reservation lookup failed: {}", e)))?;

        let domains: Option<Vec<String>> = response
            .json()
            .await
            .map_err(|e| ResolverError::Internal(format!("invalid reservation response: {}", e)))?;

        Ok(domains.unwrap_or_default())
    }

    async fn lookup_txt(&self, name: &str) -> ResolverResult<Vec<String>> {
        let response = self
            .client
            .get(&self.doh_url)
            .query(&[("name", name), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("TXT lookup failed for {}: {}", name, e);
                ResolverError::Internal(format!("TXT lookup failed: {}", e))
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| ResolverError::Internal(format!("TXT lookup failed: {}", e)))?;

        parse_txt_answer(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyType, PrivateKey};

    fn key() -> PublicKey {
        PrivateKey::from_seed(KeyType::Ed25519, [3u8; 32])
            .unwrap()
            .public_key()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unreserved_is_validated() {
        let service = StaticReservationService::new();
        assert!(service.is_validated("abc", &key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserved_needs_matching_txt() {
        let service = StaticReservationService::new()
            .with_reservation("abc", &["acme.example", "acme.test"])
            .with_txt("_keyresolver.acme.example", "something-else");
        assert!(!service.is_validated("abc", &key()).await.unwrap());

        let service = service.with_txt("_keyresolver.acme.test", &key().fingerprint());
        assert!(service.is_validated("abc", &key()).await.unwrap());
    }

    #[test]
    fn test_parse_doh_answer() {
        let body = r#"{
            "Status": 0,
            "Answer": [
                {"name": "_keyresolver.acme.example", "type": 16, "TTL": 300, "data": "\"abc\" \"def\""},
                {"name": "_keyresolver.acme.example", "type": 5, "TTL": 300, "data": "alias.example."},
                {"name": "_keyresolver.acme.example", "type": 16, "TTL": 300, "data": "\"xyz\""}
            ]
        }"#;

        assert_eq!(parse_txt_answer(body).unwrap(), vec!["abcdef", "xyz"]);
        assert!(parse_txt_answer(r#"{"Status": 3}"#).unwrap().is_empty());
        assert!(parse_txt_answer("not json").is_err());
    }

    #[test]
    fn test_remote_base_url_gets_trailing_slash() {
        let service = RemoteReservationService::new("https://example.test/reserved", "https://dns.test/q").unwrap();
        assert_eq!(service.base_url, "https://example.test/reserved/");
    }
}
