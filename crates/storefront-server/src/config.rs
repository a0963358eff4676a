use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use storefront_auth::AuthConfig;
use storefront_db_postgres::PostgresConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Read-through cache timeouts, TTLs and writer pool
    #[serde(default)]
    pub cache: CacheConfig,
    /// Document store selection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication gate
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Redis validation
        if self.redis.enabled && self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        // Cache validation
        if self.cache.lookup_timeout_ms == 0 || self.cache.write_timeout_ms == 0 {
            return Err("cache timeouts must be > 0".into());
        }
        if self.cache.categories_ttl_secs == 0
            || self.cache.products_ttl_secs == 0
            || self.cache.user_ttl_secs == 0
        {
            return Err("cache TTLs must be > 0".into());
        }
        if self.cache.writer_workers == 0 {
            return Err("cache.writer_workers must be > 0".into());
        }
        if self.cache.writer_queue_capacity == 0 {
            return Err("cache.writer_queue_capacity must be > 0".into());
        }
        // Storage validation
        if self.storage.query_timeout_ms == 0 {
            return Err("storage.query_timeout_ms must be > 0".into());
        }
        if self.storage.backend == StorageBackend::Postgres {
            let pg = &self.storage.postgres;
            if pg.url.is_empty() {
                return Err("storage.postgres.url must be set for the postgres backend".into());
            }
            if pg.pool_size == 0 {
                return Err("storage.postgres.pool_size must be > 0".into());
            }
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_body_limit_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis. Without it the server caches in-process only.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// How long a value read from Redis stays in the local tier, in seconds
    #[serde(default = "default_redis_local_ttl_secs")]
    pub local_ttl_secs: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

fn default_redis_local_ttl_secs() -> u64 {
    30
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            local_ttl_secs: default_redis_local_ttl_secs(),
        }
    }
}

impl RedisConfig {
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }
}

/// Read-through cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Budget for one cache lookup before falling back to the origin
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Budget for one background cache write
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_listing_ttl_secs")]
    pub categories_ttl_secs: u64,

    #[serde(default = "default_listing_ttl_secs")]
    pub products_ttl_secs: u64,

    #[serde(default = "default_user_ttl_secs")]
    pub user_ttl_secs: u64,

    /// Concurrent background writes
    #[serde(default = "default_writer_workers")]
    pub writer_workers: usize,

    /// Pending background writes before new ones are dropped
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
}

fn default_lookup_timeout_ms() -> u64 {
    250
}
fn default_write_timeout_ms() -> u64 {
    2000
}
fn default_listing_ttl_secs() -> u64 {
    30 * 60
}
fn default_user_ttl_secs() -> u64 {
    10 * 60
}
fn default_writer_workers() -> usize {
    4
}
fn default_writer_queue_capacity() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            categories_ttl_secs: default_listing_ttl_secs(),
            products_ttl_secs: default_listing_ttl_secs(),
            user_ttl_secs: default_user_ttl_secs(),
            writer_workers: default_writer_workers(),
            writer_queue_capacity: default_writer_queue_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
    pub fn categories_ttl(&self) -> Duration {
        Duration::from_secs(self.categories_ttl_secs)
    }
    pub fn products_ttl(&self) -> Duration {
        Duration::from_secs(self.products_ttl_secs)
    }
    pub fn user_ttl(&self) -> Duration {
        Duration::from_secs(self.user_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process store, optionally seeded from a JSON file
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Budget for one origin query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// JSON seed loaded into the memory backend at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    #[serde(default)]
    pub postgres: PostgresStorageConfig,
}

fn default_query_timeout_ms() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            query_timeout_ms: default_query_timeout_ms(),
            seed_file: None,
            postgres: PostgresStorageConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStorageConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pg_pool_size")]
    pub pool_size: u32,
    /// Create the documents table on startup
    #[serde(default = "default_pg_ensure_schema")]
    pub ensure_schema: bool,
}

fn default_pg_pool_size() -> u32 {
    10
}
fn default_pg_ensure_schema() -> bool {
    true
}

impl Default for PostgresStorageConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pg_pool_size(),
            ensure_schema: default_pg_ensure_schema(),
        }
    }
}

impl PostgresStorageConfig {
    pub fn to_backend_config(&self) -> PostgresConfig {
        PostgresConfig::new(self.url.clone())
            .with_pool_size(self.pool_size)
            .with_ensure_schema(self.ensure_schema)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "storefront.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., STOREFRONT__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("STOREFRONT")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.auth.hs256_secret = Some("dev-secret".into());
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.cache.categories_ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.cache.user_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.storage.query_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert!(!cfg.redis.enabled);
    }

    #[test]
    fn test_validate() {
        assert!(dev_config().validate().is_ok());

        // No key source for the verifier.
        assert!(AppConfig::default().validate().is_err());

        let mut cfg = dev_config();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = dev_config();
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(cfg.validate().unwrap_err().contains("storage.postgres.url"));
    }

    #[test]
    fn test_parse_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [cache]
            categories_ttl_secs = 60

            [storage]
            backend = "postgres"

            [storage.postgres]
            url = "postgres://localhost/shop"

            [auth]
            firebase_project_id = "shop"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.cache.categories_ttl_secs, 60);
        assert_eq!(cfg.cache.products_ttl_secs, 1800);
        assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
        assert_eq!(cfg.storage.postgres.to_backend_config().url, "postgres://localhost/shop");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_postgres_settings_reach_the_backend() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [storage.postgres]
            url = "postgres://db/shop"
            pool_size = 4
            ensure_schema = false
            "#,
        )
        .unwrap();
        let backend = cfg.storage.postgres.to_backend_config();
        assert_eq!(backend.url, "postgres://db/shop");
        assert_eq!(backend.pool_size, 4);
        assert!(!backend.ensure_schema);
    }
}
