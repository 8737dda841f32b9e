/// Record storage
///
/// One [`Repository`] per entity kind (addresses, routing endpoints,
/// organisations). Every backend offers the same contract: soft-deleted
/// records are invisible to [`Repository::get`], updates are compare-and-swap
/// on the serial, and every key ever bound to a hash is kept in a key history
/// with a normal/compromised status.
pub mod postgres;
pub mod redis;
pub mod sqlite;

use crate::{
    clock::Clock,
    config::{ServerConfig, StorageBackend},
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Which kind of record a repository holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Address,
    Routing,
    Organisation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Address, EntityKind::Routing, EntityKind::Organisation];

    /// Table name for relational backends, key segment for redis
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Address => "addresses",
            EntityKind::Routing => "routing",
            EntityKind::Organisation => "organisations",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Address => "address",
            EntityKind::Routing => "routing",
            EntityKind::Organisation => "organisation",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust status of a key in the history of a hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Normal,
    Compromised,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Normal => "normal",
            KeyStatus::Compromised => "compromised",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(KeyStatus::Normal),
            "compromised" => Ok(KeyStatus::Compromised),
            _ => Err(ResolverError::validation("invalid status")),
        }
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRecord {
    pub hash: String,
    pub routing_id: String,
    pub redir_hash: String,
    pub public_key: PublicKey,
    pub proof: String,
    pub validations: Vec<String>,
    pub serial: u64,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields for a new record
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub hash: String,
    pub routing_id: String,
    pub redir_hash: String,
    pub public_key: PublicKey,
    pub proof: String,
    pub validations: Vec<String>,
}

/// Mutable fields of an existing record. `hash` and `proof` never change.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub routing_id: String,
    pub redir_hash: String,
    pub public_key: PublicKey,
    pub validations: Vec<String>,
}

/// Serial for the next write: the clock in nanoseconds, but always past `previous`
pub fn next_serial(previous: Option<u64>, clock: &dyn Clock) -> u64 {
    let now = clock.now_nanos();
    match previous {
        Some(prev) => now.max(prev.saturating_add(1)),
        None => now,
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Fetch regardless of soft-delete state
    async fn get_raw(&self, hash: &str) -> ResolverResult<Option<ResolveRecord>>;

    /// Fetch a live record; soft-deleted and absent are both `NotFound`
    async fn get(&self, hash: &str) -> ResolverResult<ResolveRecord> {
        match self.get_raw(hash).await? {
            Some(record) if !record.deleted => Ok(record),
            _ => Err(ResolverError::NotFound),
        }
    }

    /// Insert a record and mark its key normal in the history.
    /// `Conflict` when any record (live or soft-deleted) already uses the hash.
    async fn create(&self, record: NewRecord) -> ResolverResult<ResolveRecord>;

    /// Replace mutable fields if the stored serial still equals `current.serial`,
    /// otherwise `Conflict` and nothing changes.
    async fn update(&self, current: &ResolveRecord, update: RecordUpdate) -> ResolverResult<ResolveRecord>;

    /// Hide the record. Returns the resulting serial; already-deleted is a no-op.
    async fn soft_delete(&self, hash: &str) -> ResolverResult<u64>;

    /// Reveal the record. Returns the resulting serial; already-live is a no-op.
    async fn soft_undelete(&self, hash: &str) -> ResolverResult<u64>;

    /// Remove the record for good. Key history is kept.
    async fn delete(&self, hash: &str) -> ResolverResult<()>;

    async fn get_key_status(&self, hash: &str, fingerprint: &str) -> ResolverResult<KeyStatus>;

    /// `NotFound` when the fingerprint was never bound to the hash
    async fn set_key_status(&self, hash: &str, fingerprint: &str, status: KeyStatus) -> ResolverResult<()>;
}

/// One repository per entity kind
#[derive(Clone)]
pub struct Repositories {
    pub addresses: Arc<dyn Repository>,
    pub routing: Arc<dyn Repository>,
    pub organisations: Arc<dyn Repository>,
}

/// Open the configured backend for all three entity kinds
pub async fn open_repositories(config: &ServerConfig, clock: Arc<dyn Clock>) -> ResolverResult<Repositories> {
    info!("Opening {} storage backend", config.storage.backend);

    let repos = match config.storage.backend {
        StorageBackend::Sqlite => {
            let pool = sqlite::create_pool(&config.storage.sqlite_path, sqlite::DatabaseOptions::default()).await?;
            sqlite::test_connection(&pool).await?;
            let build = |kind| -> Arc<dyn Repository> {
                Arc::new(sqlite::SqliteRepository::new(pool.clone(), kind, clock.clone()))
            };
            for kind in EntityKind::ALL {
                sqlite::init_schema(&pool, kind).await?;
            }
            Repositories {
                addresses: build(EntityKind::Address),
                routing: build(EntityKind::Routing),
                organisations: build(EntityKind::Organisation),
            }
        }
        StorageBackend::Postgres => {
            let pg = config
                .storage
                .postgres
                .clone()
                .ok_or_else(|| ResolverError::Internal("DATABASE_URL must be set for PostgreSQL".to_string()))?;
            let pool = postgres::create_pool(pg).await?;
            for kind in EntityKind::ALL {
                postgres::init_schema(&pool, kind).await?;
            }
            let build = |kind| -> Arc<dyn Repository> {
                Arc::new(postgres::PostgresRepository::new(pool.clone(), kind, clock.clone()))
            };
            Repositories {
                addresses: build(EntityKind::Address),
                routing: build(EntityKind::Routing),
                organisations: build(EntityKind::Organisation),
            }
        }
        StorageBackend::Redis => {
            let connection = redis::connect(&config.storage.redis_url).await?;
            let prefix = config.storage.redis_prefix.clone();
            let build = |kind| -> Arc<dyn Repository> {
                Arc::new(redis::RedisRepository::new(
                    connection.clone(),
                    prefix.clone(),
                    kind,
                    clock.clone(),
                ))
            };
            Repositories {
                addresses: build(EntityKind::Address),
                routing: build(EntityKind::Routing),
                organisations: build(EntityKind::Organisation),
            }
        }
    };

    Ok(repos)
}
