/// Routing records: where mail for a routing id is delivered
use super::{ResolveEngine, WriteOutcome};
use crate::{
    auth::{hash_serial_message, require_signature},
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
    hash::Hash,
    metrics,
    repository::{NewRecord, RecordUpdate, ResolveRecord},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingUpload {
    pub public_key: PublicKey,
    pub routing: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoutingInfo {
    pub hash: String,
    pub routing: String,
    pub public_key: PublicKey,
    pub serial_number: u64,
}

impl From<ResolveRecord> for RoutingInfo {
    fn from(record: ResolveRecord) -> Self {
        Self {
            hash: record.hash,
            routing: record.routing_id,
            public_key: record.public_key,
            serial_number: record.serial,
        }
    }
}

/// `host` with `default_port` appended when it carries none
pub fn normalize_routing(host: &str, default_port: u16) -> String {
    let host = host.trim();

    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    if host.starts_with('[') && host.ends_with(']') {
        return format!("{}:{}", host, default_port);
    }
    if host.matches(':').count() > 1 {
        // bare IPv6 literal
        return format!("[{}]:{}", host, default_port);
    }
    match host.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{}:{}", host, default_port),
    }
}

async fn validate_routing(host: &str, default_port: u16) -> ResolverResult<()> {
    if host.trim().is_empty() {
        return Err(ResolverError::validation("invalid routing"));
    }

    let target = normalize_routing(host, default_port);
    let lookup = tokio::net::lookup_host(target.clone()).await;
    match lookup {
        Ok(mut addrs) => {
            if addrs.next().is_some() {
                Ok(())
            } else {
                Err(ResolverError::validation("invalid routing"))
            }
        }
        Err(e) => {
            debug!("routing {} does not resolve: {}", target, e);
            Err(ResolverError::validation("invalid routing"))
        }
    }
}

impl ResolveEngine {
    pub async fn get_routing(&self, hash: &Hash) -> ResolverResult<RoutingInfo> {
        let record = self.repos.routing.get(hash.as_str()).await?;
        Ok(record.into())
    }

    /// Create the routing record, or update it when one exists. Routing
    /// records need no proof-of-work.
    pub async fn upsert_routing(
        &self,
        hash: &Hash,
        upload: RoutingUpload,
        auth: Option<&str>,
    ) -> ResolverResult<WriteOutcome> {
        validate_routing(&upload.routing, self.policy.default_routing_port).await?;
        let routing = upload.routing.trim().to_string();

        let current = match self.repos.routing.get(hash.as_str()).await {
            Ok(record) => Some(record),
            Err(ResolverError::NotFound) => None,
            Err(e) => return Err(e),
        };

        match current {
            None => {
                self.repos
                    .routing
                    .create(NewRecord {
                        hash: hash.to_string(),
                        routing_id: routing,
                        redir_hash: String::new(),
                        public_key: upload.public_key,
                        proof: String::new(),
                        validations: Vec::new(),
                    })
                    .await?;

                info!("routing {} created", hash);
                metrics::record_write("routing", "create");
                Ok(WriteOutcome::Created)
            }
            Some(current) => {
                require_signature(
                    auth,
                    &current.public_key,
                    &hash_serial_message(&current.hash, current.serial),
                )?;

                self.repos
                    .routing
                    .update(
                        &current,
                        RecordUpdate {
                            routing_id: routing,
                            redir_hash: String::new(),
                            public_key: upload.public_key,
                            validations: Vec::new(),
                        },
                    )
                    .await?;

                info!("routing {} updated", hash);
                metrics::record_write("routing", "update");
                Ok(WriteOutcome::Updated)
            }
        }
    }

    pub async fn delete_routing(&self, hash: &Hash, auth: Option<&str>) -> ResolverResult<()> {
        let current = self.repos.routing.get(hash.as_str()).await?;
        require_signature(
            auth,
            &current.public_key,
            &hash_serial_message(&current.hash, current.serial),
        )?;

        self.repos.routing.delete(hash.as_str()).await?;

        info!("routing {} deleted", hash);
        metrics::record_write("routing", "delete");
        Ok(())
    }
}
