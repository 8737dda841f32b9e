/// Embedded single-file storage backend (SQLite)
use super::{next_serial, EntityKind, KeyStatus, NewRecord, RecordUpdate, Repository, ResolveRecord};
use crate::{
    clock::Clock,
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool. `:memory:` opens a private in-memory database.
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> ResolverResult<SqlitePool> {
    if path == Path::new(":memory:") {
        return create_memory_pool().await;
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("Opening SQLite database at {}", path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// In-memory database on a single connection, so every query sees the same data
pub async fn create_memory_pool() -> ResolverResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ResolverResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the record and key-history tables for `kind`
pub async fn init_schema(pool: &SqlitePool, kind: EntityKind) -> ResolverResult<()> {
    let table = kind.table();

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            hash TEXT PRIMARY KEY NOT NULL,
            routing_id TEXT NOT NULL DEFAULT '',
            redir_hash TEXT NOT NULL DEFAULT '',
            public_key TEXT NOT NULL,
            proof TEXT NOT NULL DEFAULT '',
            validations TEXT NOT NULL DEFAULT '[]',
            serial INTEGER NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table}_keys (
            hash TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY (hash, fingerprint)
        )
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) fn encode_validations(validations: &[String]) -> ResolverResult<String> {
    serde_json::to_string(validations)
        .map_err(|e| ResolverError::Storage(format!("cannot encode validations: {}", e)))
}

pub(crate) fn decode_validations(raw: &str) -> ResolverResult<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| ResolverError::Storage(format!("corrupt validations: {}", e)))
}

pub(crate) fn decode_public_key(raw: &str) -> ResolverResult<PublicKey> {
    PublicKey::parse(raw).map_err(|e| ResolverError::Storage(format!("corrupt public key: {}", e)))
}

pub(crate) fn decode_timestamp(raw: Option<String>) -> ResolverResult<Option<DateTime<Utc>>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ResolverError::Storage(format!("corrupt timestamp: {}", e)))
        })
        .transpose()
}

fn row_to_record(row: &SqliteRow) -> ResolverResult<ResolveRecord> {
    let serial: i64 = row.try_get("serial")?;
    let deleted: i64 = row.try_get("deleted")?;

    Ok(ResolveRecord {
        hash: row.try_get("hash")?,
        routing_id: row.try_get("routing_id")?,
        redir_hash: row.try_get("redir_hash")?,
        public_key: decode_public_key(&row.try_get::<String, _>("public_key")?)?,
        proof: row.try_get("proof")?,
        validations: decode_validations(&row.try_get::<String, _>("validations")?)?,
        serial: serial as u64,
        deleted: deleted != 0,
        deleted_at: decode_timestamp(row.try_get("deleted_at")?)?,
    })
}

/// Records of one entity kind in SQLite
pub struct SqliteRepository {
    db: SqlitePool,
    kind: EntityKind,
    clock: Arc<dyn Clock>,
}

impl SqliteRepository {
    pub fn new(db: SqlitePool, kind: EntityKind, clock: Arc<dyn Clock>) -> Self {
        Self { db, kind, clock }
    }

    fn table(&self) -> &'static str {
        self.kind.table()
    }

    async fn toggle_deleted(&self, hash: &str, deleted: bool) -> ResolverResult<u64> {
        let deleted_at = deleted.then(|| self.clock.now().to_rfc3339());

        let row = sqlx::query(&format!(
            r#"
            UPDATE {} SET deleted = ?, deleted_at = ?, serial = MAX(serial + 1, ?)
            WHERE hash = ? AND deleted = ?
            RETURNING serial
            "#,
            self.table()
        ))
        .bind(deleted as i64)
        .bind(deleted_at)
        .bind(self.clock.now_nanos() as i64)
        .bind(hash)
        .bind(!deleted as i64)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let serial: i64 = row.try_get("serial")?;
                debug!("{} {} deleted={} serial={}", self.kind, hash, deleted, serial);
                Ok(serial as u64)
            }
            // Already in the requested state, or no record at all
            None => self
                .get_raw(hash)
                .await?
                .map(|r| r.serial)
                .ok_or(ResolverError::NotFound),
        }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get_raw(&self, hash: &str) -> ResolverResult<Option<ResolveRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT hash, routing_id, redir_hash, public_key, proof, validations, serial, deleted, deleted_at
            FROM {}
            WHERE hash = ?
            "#,
            self.table()
        ))
        .bind(hash)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(&self, record: NewRecord) -> ResolverResult<ResolveRecord> {
        let serial = next_serial(None, self.clock.as_ref());
        let validations = encode_validations(&record.validations)?;

        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO {} (hash, routing_id, redir_hash, public_key, proof, validations, serial, deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT (hash) DO NOTHING
            "#,
            self.table()
        ))
        .bind(&record.hash)
        .bind(&record.routing_id)
        .bind(&record.redir_hash)
        .bind(record.public_key.to_string())
        .bind(&record.proof)
        .bind(&validations)
        .bind(serial as i64)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(ResolverError::Conflict);
        }

        upsert_key(&mut tx, self.table(), &record.hash, &record.public_key).await?;
        tx.commit().await?;

        debug!("{} {} created serial={}", self.kind, record.hash, serial);

        Ok(ResolveRecord {
            hash: record.hash,
            routing_id: record.routing_id,
            redir_hash: record.redir_hash,
            public_key: record.public_key,
            proof: record.proof,
            validations: record.validations,
            serial,
            deleted: false,
            deleted_at: None,
        })
    }

    async fn update(&self, current: &ResolveRecord, update: RecordUpdate) -> ResolverResult<ResolveRecord> {
        let serial = next_serial(Some(current.serial), self.clock.as_ref());
        let validations = encode_validations(&update.validations)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET routing_id = ?, redir_hash = ?, public_key = ?, validations = ?, serial = ?
            WHERE hash = ? AND serial = ? AND deleted = 0
            "#,
            self.table()
        ))
        .bind(&update.routing_id)
        .bind(&update.redir_hash)
        .bind(update.public_key.to_string())
        .bind(&validations)
        .bind(serial as i64)
        .bind(&current.hash)
        .bind(current.serial as i64)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            debug!("{} {} stale serial {}", self.kind, current.hash, current.serial);
            return Err(ResolverError::Conflict);
        }

        upsert_key(&mut tx, self.table(), &current.hash, &update.public_key).await?;
        tx.commit().await?;

        Ok(ResolveRecord {
            hash: current.hash.clone(),
            routing_id: update.routing_id,
            redir_hash: update.redir_hash,
            public_key: update.public_key,
            proof: current.proof.clone(),
            validations: update.validations,
            serial,
            deleted: false,
            deleted_at: None,
        })
    }

    async fn soft_delete(&self, hash: &str) -> ResolverResult<u64> {
        self.toggle_deleted(hash, true).await
    }

    async fn soft_undelete(&self, hash: &str) -> ResolverResult<u64> {
        self.toggle_deleted(hash, false).await
    }

    async fn delete(&self, hash: &str) -> ResolverResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE hash = ?", self.table()))
            .bind(hash)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ResolverError::NotFound);
        }

        debug!("{} {} removed", self.kind, hash);
        Ok(())
    }

    async fn get_key_status(&self, hash: &str, fingerprint: &str) -> ResolverResult<KeyStatus> {
        let row = sqlx::query(&format!(
            "SELECT status FROM {}_keys WHERE hash = ? AND fingerprint = ?",
            self.table()
        ))
        .bind(hash)
        .bind(fingerprint)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ResolverError::NotFound)?;

        let status: String = row.try_get("status")?;
        status
            .parse()
            .map_err(|_| ResolverError::Storage(format!("unknown key status {}", status)))
    }

    async fn set_key_status(&self, hash: &str, fingerprint: &str, status: KeyStatus) -> ResolverResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {}_keys SET status = ? WHERE hash = ? AND fingerprint = ?",
            self.table()
        ))
        .bind(status.as_str())
        .bind(hash)
        .bind(fingerprint)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ResolverError::NotFound);
        }

        Ok(())
    }
}

async fn upsert_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    hash: &str,
    key: &PublicKey,
) -> ResolverResult<()> {
    sqlx::query(&format!(
        r#"
        INSERT INTO {table}_keys (hash, fingerprint, status) VALUES (?, ?, ?)
        ON CONFLICT (hash, fingerprint) DO UPDATE SET status = excluded.status
        "#
    ))
    .bind(hash)
    .bind(key.fingerprint())
    .bind(KeyStatus::Normal.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(())
}
