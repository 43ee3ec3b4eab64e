//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PGUSER` - `PostgreSQL` user
//! - `PGPASSWORD` - `PostgreSQL` password
//! - `PGDATABASE` - `PostgreSQL` database name
//! - `KAFKA_BROKERS` - Comma-separated broker list (e.g., `localhost:9092,localhost:9093`)
//! - `KAFKA_TOPIC` - Topic carrying order payloads
//! - `KAFKA_GROUP_ID` - Consumer group id
//!
//! ## Optional
//! - `DATABASE_URL` - Full connection string; overrides the `PG*` variables
//! - `PGHOST` - Database host (default: localhost)
//! - `PGPORT` - Database port (default: 5432)
//! - `PGSSLMODE` - `disable`, `prefer`, `require`, ... (default: disable)
//! - `HTTP_HOST` - Bind address (default: 127.0.0.1)
//! - `HTTP_PORT` - Listen port (default: 8080)
//! - `CACHE_CAPACITY` - Maximum cached orders (default: 1000)
//! - `CACHE_REFILL` - `on-miss` or `never` (default: on-miss)
//! - `RUN_MIGRATIONS` - Apply migrations at startup (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

use crate::service::RefillPolicy;

const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection settings
    pub database: DatabaseConfig,
    /// IP address to bind the HTTP server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Kafka consumer settings
    pub kafka: KafkaConfig,
    /// Order cache settings
    pub cache: CacheConfig,
    /// Apply embedded migrations before serving
    pub run_migrations: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// `PostgreSQL` connection settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub database: String,
    pub ssl_mode: PgSslMode,
    /// Full connection string, used instead of the fields above when set
    pub url: Option<SecretString>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Kafka consumer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Bootstrap brokers
    pub brokers: Vec<String>,
    /// Topic carrying order payloads
    pub topic: String,
    /// Consumer group id
    pub group_id: String,
}

/// Order cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resident orders
    pub capacity: u64,
    /// Whether store fallbacks repopulate the cache
    pub refill: RefillPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            refill: RefillPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig::from_env()?;
        let host = parse_env("HTTP_HOST", "127.0.0.1")?;
        let port = parse_env("HTTP_PORT", "8080")?;
        let kafka = KafkaConfig::from_env()?;
        let cache = CacheConfig::from_env()?;
        let run_migrations = parse_env("RUN_MIGRATIONS", "false")?;

        Ok(Self {
            database,
            host,
            port,
            kafka,
            cache,
            run_migrations,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl DatabaseConfig {
    /// Load database settings from environment variables.
    ///
    /// When `DATABASE_URL` is set the `PG*` variables become optional.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let url = get_optional_env("DATABASE_URL").map(SecretString::from);
        let required = |key: &str| {
            if url.is_some() {
                Ok(get_env_or_default(key, ""))
            } else {
                get_required_env(key)
            }
        };

        let ssl_mode = get_env_or_default("PGSSLMODE", "disable");
        let ssl_mode = PgSslMode::from_str(&ssl_mode)
            .map_err(|e| ConfigError::InvalidEnvVar("PGSSLMODE".to_string(), e.to_string()))?;

        Ok(Self {
            host: get_env_or_default("PGHOST", "localhost"),
            port: parse_env("PGPORT", "5432")?,
            user: required("PGUSER")?,
            password: SecretString::from(required("PGPASSWORD")?),
            database: required("PGDATABASE")?,
            ssl_mode,
            url,
        })
    }

    /// Build `sqlx` connection options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `DATABASE_URL` does not parse.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url.expose_secret())
                .map_err(|e| ConfigError::InvalidEnvVar("DATABASE_URL".to_string(), e.to_string()));
        }

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.database)
            .ssl_mode(self.ssl_mode))
    }
}

impl KafkaConfig {
    /// Load Kafka settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or the broker
    /// list is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let brokers = parse_brokers(&get_required_env("KAFKA_BROKERS")?);
        if brokers.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "KAFKA_BROKERS".to_string(),
                "at least one broker is required".to_string(),
            ));
        }

        Ok(Self {
            brokers,
            topic: get_required_env("KAFKA_TOPIC")?,
            group_id: get_required_env("KAFKA_GROUP_ID")?,
        })
    }

    /// Brokers in the `host:port,host:port` form librdkafka expects.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let capacity: u64 = parse_env("CACHE_CAPACITY", "1000")?;
        if capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CACHE_CAPACITY".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            refill: parse_env("CACHE_REFILL", "on-miss")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated broker list, dropping blanks.
fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
