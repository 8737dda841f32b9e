/// Application context and dependency injection
use crate::{
    clock::{Clock, SystemClock},
    config::{PolicyConfig, ServerConfig},
    engine::ResolveEngine,
    error::ResolverResult,
    repository::{self, sqlite, EntityKind, Repositories, Repository},
    reservation::{RemoteReservationService, ReservationService, StaticReservationService},
};
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub engine: Arc<ResolveEngine>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ResolverResult<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let repos = repository::open_repositories(&config, clock.clone()).await?;

        let reservations: Arc<dyn ReservationService> = if config.reservations.enabled {
            Arc::new(RemoteReservationService::new(
                &config.reservations.url,
                &config.reservations.doh_url,
            )?)
        } else {
            tracing::info!("Organisation reservation checks disabled");
            Arc::new(StaticReservationService::new())
        };

        let engine = ResolveEngine::new(repos, reservations, clock, config.policy);

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        })
    }

    /// Context over a private in-memory SQLite store, for tests and local tooling
    pub async fn in_memory(
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
        reservations: Arc<dyn ReservationService>,
    ) -> ResolverResult<Self> {
        let pool = sqlite::create_memory_pool().await?;
        for kind in EntityKind::ALL {
            sqlite::init_schema(&pool, kind).await?;
        }

        let build = |kind| -> Arc<dyn Repository> {
            Arc::new(sqlite::SqliteRepository::new(pool.clone(), kind, clock.clone()))
        };
        let repos = Repositories {
            addresses: build(EntityKind::Address),
            routing: build(EntityKind::Routing),
            organisations: build(EntityKind::Organisation),
        };

        let config = ServerConfig {
            policy,
            ..ServerConfig::default()
        };
        let engine = ResolveEngine::new(repos, reservations, clock, policy);

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        })
    }
}
