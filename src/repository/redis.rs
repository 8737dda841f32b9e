/// Redis key-value storage backend
///
/// A record is a hash at `{prefix}{table}:{hash}` and its key history a hash
/// at `{prefix}{table}:{hash}:keys` mapping fingerprint to status. Every
/// conditional write is a Lua script so the serial comparison and the write
/// happen atomically on the server.
use super::sqlite::decode_timestamp;
use super::{next_serial, EntityKind, KeyStatus, NewRecord, RecordUpdate, Repository, ResolveRecord};
use crate::{
    clock::Clock,
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'hash', ARGV[1], 'routing_id', ARGV[2], 'redir_hash', ARGV[3], 'public_key', ARGV[4],
    'proof', ARGV[5], 'validations', ARGV[6], 'serial', ARGV[7], 'deleted', '0', 'deleted_at', '')
redis.call('HSET', KEYS[2], ARGV[8], 'normal')
return 1
"#;

const UPDATE_SCRIPT: &str = r#"
local current = redis.call('HMGET', KEYS[1], 'serial', 'deleted')
if current[1] ~= ARGV[1] or current[2] ~= '0' then
    return 0
end
redis.call('HSET', KEYS[1],
    'routing_id', ARGV[2], 'redir_hash', ARGV[3], 'public_key', ARGV[4],
    'validations', ARGV[5], 'serial', ARGV[6])
redis.call('HSET', KEYS[2], ARGV[7], 'normal')
return 1
"#;

const TOGGLE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'serial') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'deleted', ARGV[3], 'deleted_at', ARGV[4], 'serial', ARGV[2])
return 1
"#;

const SET_STATUS_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

/// Open a managed connection that reconnects on failure
pub async fn connect(redis_url: &str) -> ResolverResult<ConnectionManager> {
    info!("Connecting to Redis at {}", redis_url);

    let client = Client::open(redis_url).map_err(|e| {
        error!("Failed to create Redis client: {}", e);
        ResolverError::Redis(e)
    })?;

    let connection = ConnectionManager::new(client).await.map_err(|e| {
        error!("Failed to connect to Redis: {}", e);
        ResolverError::Redis(e)
    })?;

    info!("✓ Redis connection established");

    Ok(connection)
}

/// Records of one entity kind in Redis
pub struct RedisRepository {
    connection: ConnectionManager,
    key_prefix: String,
    kind: EntityKind,
    clock: Arc<dyn Clock>,
    create_script: Script,
    update_script: Script,
    toggle_script: Script,
    set_status_script: Script,
}

impl RedisRepository {
    pub fn new(connection: ConnectionManager, key_prefix: String, kind: EntityKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            connection,
            key_prefix,
            kind,
            clock,
            create_script: Script::new(CREATE_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            toggle_script: Script::new(TOGGLE_SCRIPT),
            set_status_script: Script::new(SET_STATUS_SCRIPT),
        }
    }

    fn record_key(&self, hash: &str) -> String {
        format!("{}{}:{}", self.key_prefix, self.kind.table(), hash)
    }

    fn history_key(&self, hash: &str) -> String {
        format!("{}:keys", self.record_key(hash))
    }

    fn parse_record(&self, fields: HashMap<String, String>) -> ResolverResult<ResolveRecord> {
        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

        let serial = field("serial").parse::<u64>().map_err(|e| {
            warn!("corrupt serial in {}: {}", self.kind, e);
            ResolverError::Storage(format!("corrupt serial: {}", e))
        })?;

        let validations = serde_json::from_str(&field("validations"))
            .map_err(|e| ResolverError::Storage(format!("corrupt validations: {}", e)))?;

        let public_key = PublicKey::parse(&field("public_key"))
            .map_err(|e| ResolverError::Storage(format!("corrupt public key: {}", e)))?;

        Ok(ResolveRecord {
            hash: field("hash"),
            routing_id: field("routing_id"),
            redir_hash: field("redir_hash"),
            public_key,
            proof: field("proof"),
            validations,
            serial,
            deleted: field("deleted") == "1",
            deleted_at: decode_timestamp(fields.get("deleted_at").cloned())?,
        })
    }

    async fn toggle_deleted(&self, hash: &str, deleted: bool) -> ResolverResult<u64> {
        let current = self.get_raw(hash).await?.ok_or(ResolverError::NotFound)?;
        if current.deleted == deleted {
            return Ok(current.serial);
        }

        let serial = next_serial(Some(current.serial), self.clock.as_ref());
        let deleted_at = if deleted { self.clock.now().to_rfc3339() } else { String::new() };

        let mut conn = self.connection.clone();
        let applied: i64 = self
            .toggle_script
            .key(self.record_key(hash))
            .arg(current.serial.to_string())
            .arg(serial.to_string())
            .arg(if deleted { "1" } else { "0" })
            .arg(deleted_at)
            .invoke_async(&mut conn)
            .await?;

        if applied == 0 {
            return Err(ResolverError::Conflict);
        }

        debug!("{} {} deleted={} serial={}", self.kind, hash, deleted, serial);
        Ok(serial)
    }
}

#[async_trait]
impl Repository for RedisRepository {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn get_raw(&self, hash: &str) -> ResolverResult<Option<ResolveRecord>> {
        let key = self.record_key(hash);
        debug!("Redis HGETALL: {}", key);

        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        self.parse_record(fields).map(Some)
    }

    async fn create(&self, record: NewRecord) -> ResolverResult<ResolveRecord> {
        let serial = next_serial(None, self.clock.as_ref());
        let validations = serde_json::to_string(&record.validations)
            .map_err(|e| ResolverError::Storage(format!("cannot encode validations: {}", e)))?;

        let mut conn = self.connection.clone();
        let created: i64 = self
            .create_script
            .key(self.record_key(&record.hash))
            .key(self.history_key(&record.hash))
            .arg(&record.hash)
            .arg(&record.routing_id)
            .arg(&record.redir_hash)
            .arg(record.public_key.to_string())
            .arg(&record.proof)
            .arg(validations)
            .arg(serial.to_string())
            .arg(record.public_key.fingerprint())
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(ResolverError::Conflict);
        }

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
        let validations = serde_json::to_string(&update.validations)
            .map_err(|e| ResolverError::Storage(format!("cannot encode validations: {}", e)))?;

        let mut conn = self.connection.clone();
        let applied: i64 = self
            .update_script
            .key(self.record_key(&current.hash))
            .key(self.history_key(&current.hash))
            .arg(current.serial.to_string())
            .arg(&update.routing_id)
            .arg(&update.redir_hash)
            .arg(update.public_key.to_string())
            .arg(validations)
            .arg(serial.to_string())
            .arg(update.public_key.fingerprint())
            .invoke_async(&mut conn)
            .await?;

        if applied == 0 {
            debug!("{} {} stale serial {}", self.kind, current.hash, current.serial);
            return Err(ResolverError::Conflict);
        }

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
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(self.record_key(hash)).await?;

        if removed == 0 {
            return Err(ResolverError::NotFound);
        }

        Ok(())
    }

    async fn get_key_status(&self, hash: &str, fingerprint: &str) -> ResolverResult<KeyStatus> {
        let mut conn = self.connection.clone();
        let status: Option<String> = conn.hget(self.history_key(hash), fingerprint).await?;

        let status = status.ok_or(ResolverError::NotFound)?;
        status
            .parse()
            .map_err(|_| ResolverError::Storage(format!("unknown key status {}", status)))
    }

    async fn set_key_status(&self, hash: &str, fingerprint: &str, status: KeyStatus) -> ResolverResult<()> {
        let mut conn = self.connection.clone();
        let applied: i64 = self
            .set_status_script
            .key(self.history_key(hash))
            .arg(fingerprint)
            .arg(status.as_str())
            .invoke_async(&mut conn)
            .await?;

        if applied == 0 {
            return Err(ResolverError::NotFound);
        }

        Ok(())
    }
}
