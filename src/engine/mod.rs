/// Resolution and mutation engine
///
/// Composes the repositories, redirect walker, proof-of-work gate, bearer
/// signatures and invite tokens into the per-entity operations. Every check
/// runs before the first write; a failed check never leaves a partial update.
pub mod address;
pub mod organisation;
pub mod routing;

pub use address::{AddressDeleteRequest, AddressInfo, AddressUpload, KeyStatusInfo};
pub use organisation::{OrganisationInfo, OrganisationUpload};
pub use routing::{RoutingInfo, RoutingUpload};

use crate::{
    clock::Clock,
    config::PolicyConfig,
    redirect::RedirectResolver,
    repository::Repositories,
    reservation::ReservationService,
};
use std::sync::Arc;

/// Whether an upsert created a record or changed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

#[derive(Clone)]
pub struct ResolveEngine {
    repos: Repositories,
    reservations: Arc<dyn ReservationService>,
    clock: Arc<dyn Clock>,
    policy: PolicyConfig,
}

impl ResolveEngine {
    pub fn new(
        repos: Repositories,
        reservations: Arc<dyn ReservationService>,
        clock: Arc<dyn Clock>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            repos,
            reservations,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    fn redirects(&self) -> RedirectResolver {
        RedirectResolver::new(self.repos.addresses.clone(), self.policy.max_redirect_depth)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::{address_message, authorization_header, hash_serial_message, key_status_message};
    use crate::clock::FixedClock;
    use crate::crypto::{KeyType, PrivateKey};
    use crate::repository::{sqlite, EntityKind, Repository, ResolveRecord};
    use crate::reservation::StaticReservationService;

    pub struct Harness {
        pub engine: ResolveEngine,
        pub clock: Arc<FixedClock>,
        pub repos: Repositories,
    }

    pub fn policy() -> PolicyConfig {
        PolicyConfig {
            pow_bits_address: 4,
            pow_bits_organisation: 5,
            max_redirect_depth: 10,
            default_routing_port: 2424,
        }
    }

    pub async fn harness_with(reservations: StaticReservationService, policy: PolicyConfig) -> Harness {
        let pool = sqlite::create_memory_pool().await.unwrap();
        let clock = Arc::new(FixedClock::from_unix(1_700_000_000));
        for kind in EntityKind::ALL {
            sqlite::init_schema(&pool, kind).await.unwrap();
        }
        let build = |kind| -> Arc<dyn Repository> {
            Arc::new(sqlite::SqliteRepository::new(pool.clone(), kind, clock.clone()))
        };
        let repos = Repositories {
            addresses: build(EntityKind::Address),
            routing: build(EntityKind::Routing),
            organisations: build(EntityKind::Organisation),
        };

        let engine = ResolveEngine::new(repos.clone(), Arc::new(reservations), clock.clone(), policy);
        Harness { engine, clock, repos }
    }

    pub async fn harness() -> Harness {
        harness_with(StaticReservationService::new(), policy()).await
    }

    pub fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_seed(KeyType::Ed25519, [seed; 32]).unwrap()
    }

    /// Owner signature for an address write against `record`
    pub fn sign_address(record: &ResolveRecord, key: &PrivateKey) -> String {
        authorization_header(
            address_message(&record.hash, &record.routing_id, record.serial).as_bytes(),
            key,
        )
        .unwrap()
    }

    /// Owner signature for changing `fingerprint` to `status` on `record`
    pub fn sign_key_status(record: &ResolveRecord, fingerprint: &str, status: &str, key: &PrivateKey) -> String {
        authorization_header(
            key_status_message(&record.hash, &record.routing_id, record.serial, fingerprint, status).as_bytes(),
            key,
        )
        .unwrap()
    }

    /// Signature over `hash + serial`
    pub fn sign_hash(hash: &str, serial: u64, key: &PrivateKey) -> String {
        authorization_header(hash_serial_message(hash, serial).as_bytes(), key).unwrap()
    }
}
