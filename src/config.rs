/// Configuration management for the key resolver
use crate::{
    error::{ResolverError, ResolverResult},
    repository::postgres::PostgresConfig,
};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_LOG_FILTER: &str = "key_resolver=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub policy: PolicyConfig,
    pub reservations: ReservationConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Which storage engine backs the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Postgres,
    Redis,
}

impl FromStr for StorageBackend {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(ResolverError::validation(format!("unknown storage backend: {}", other))),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Postgres => "postgres",
            StorageBackend::Redis => "redis",
        })
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
    pub postgres: Option<PostgresConfig>,
    pub redis_url: String,
    pub redis_prefix: String,
}

/// Admission and resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Minimum proof-of-work bits for a new address
    pub pow_bits_address: u32,
    /// Minimum proof-of-work bits for a new organisation
    pub pow_bits_organisation: u32,
    pub max_redirect_depth: usize,
    /// Appended to routing hosts given without a port
    pub default_routing_port: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pow_bits_address: 27,
            pow_bits_organisation: 29,
            max_redirect_depth: crate::redirect::DEFAULT_MAX_DEPTH,
            default_routing_port: 2424,
        }
    }
}

/// Organisation reservation check
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub enabled: bool,
    pub url: String,
    pub doh_url: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ResolverResult<Self> {
        // Load .env file if present
        dotenv::dotenv().ok();

        let hostname = env::var("RESOLVER_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("RESOLVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);
        let version = env!("CARGO_PKG_VERSION").to_string();

        let backend = env::var("RESOLVER_STORAGE")
            .unwrap_or_else(|_| "sqlite".to_string())
            .parse()?;
        let sqlite_path = env::var("RESOLVER_SQLITE_PATH")
            .unwrap_or_else(|_| "./data/resolver.sqlite".to_string())
            .into();
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let redis_prefix = env::var("RESOLVER_REDIS_PREFIX").unwrap_or_else(|_| "keyresolver:".to_string());

        let defaults = PolicyConfig::default();
        let pow_bits_address = env::var("RESOLVER_POW_BITS_ADDRESS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.pow_bits_address);
        let pow_bits_organisation = env::var("RESOLVER_POW_BITS_ORGANISATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.pow_bits_organisation);
        let max_redirect_depth = env::var("RESOLVER_MAX_REDIRECT_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_redirect_depth);
        let default_routing_port = env::var("RESOLVER_DEFAULT_ROUTING_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_routing_port);

        let reservations_enabled = env::var("RESOLVER_RESERVATIONS_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let reservation_url = env::var("RESOLVER_RESERVATION_URL")
            .unwrap_or_else(|_| "https://resolver.bitmaelum.org/reserved/".to_string());
        let doh_url =
            env::var("RESOLVER_DOH_URL").unwrap_or_else(|_| "https://cloudflare-dns.com/dns-query".to_string());

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let log_json = env::var("RESOLVER_LOG_JSON")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                backend,
                sqlite_path,
                postgres: PostgresConfig::from_env(),
                redis_url,
                redis_prefix,
            },
            policy: PolicyConfig {
                pow_bits_address,
                pow_bits_organisation,
                max_redirect_depth,
                default_routing_port,
            },
            reservations: ReservationConfig {
                enabled: reservations_enabled,
                url: reservation_url,
                doh_url,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ResolverResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ResolverError::validation("Hostname cannot be empty"));
        }

        if self.service.port == 0 {
            return Err(ResolverError::validation("Port cannot be zero"));
        }

        if self.policy.max_redirect_depth == 0 {
            return Err(ResolverError::validation("Maximum redirect depth must be at least 1"));
        }

        if self.policy.pow_bits_address > 256 || self.policy.pow_bits_organisation > 256 {
            return Err(ResolverError::validation("Proof-of-work bits cannot exceed 256"));
        }

        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres.is_none() {
            return Err(ResolverError::validation(
                "DATABASE_URL or POSTGRES_URL must be set for the postgres backend",
            ));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                hostname: "0.0.0.0".to_string(),
                port: 8080,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                sqlite_path: PathBuf::from("./data/resolver.sqlite"),
                postgres: None,
                redis_url: "redis://localhost:6379".to_string(),
                redis_prefix: "keyresolver:".to_string(),
            },
            policy: PolicyConfig::default(),
            reservations: ReservationConfig {
                enabled: false,
                url: "https://resolver.bitmaelum.org/reserved/".to_string(),
                doh_url: "https://cloudflare-dns.com/dns-query".to_string(),
            },
            logging: LoggingConfig {
                level: DEFAULT_LOG_FILTER.to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy.pow_bits_address, 27);
        assert_eq!(config.policy.pow_bits_organisation, 29);
        assert_eq!(config.policy.max_redirect_depth, 10);
        assert_eq!(config.policy.default_routing_port, 2424);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqlite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert_eq!("PostgreSQL".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert_eq!(" redis ".parse::<StorageBackend>().unwrap(), StorageBackend::Redis);
        assert!("dynamodb".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ServerConfig::default();
        config.policy.max_redirect_depth = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.policy.pow_bits_organisation = 300;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.service.port = 0;
        assert!(config.validate().is_err());
    }
}
