//! Configuration types
//!
//! [`RosterConfig`] is assembled once at startup from environment variables
//! and handed to every component. All validation happens here: a config that
//! was built successfully is complete.

use crate::error::ConfigError;
use crate::identifier::TableName;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Variables that must be present (and non-empty) before the service starts.
pub const REQUIRED_VARS: [&str; 3] = ["DATABASE_HOST", "DATABASE_USER", "DATABASE_PASSWORD"];

/// The single cache slot holding the row set snapshot.
pub const SHARED_CACHE_KEY: &str = "employees_cache";

/// Lifetime of the cached row set.
pub const SHARED_CACHE_TTL: Duration = Duration::from_secs(30);

/// Idle lifetime of a server-side session (31 days).
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Most sessions an in-process session store keeps at once.
pub const DEFAULT_SESSION_CAPACITY: usize = 100_000;

/// Record store connection settings.
#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database name, validated the same way as table names.
    pub name: TableName,
    pub table: TableName,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

/// Shared cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for one cache call (connect, write and read together).
    pub timeout: Duration,
    pub key: String,
    pub ttl: Duration,
}

/// Where visit counters are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// One key per session on the shared Redis server, so every instance
    /// sees the same counter.
    Redis,
    /// Process-local map. Multi-instance deployments need sticky routing.
    Memory,
}

impl FromStr for SessionBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            _ => Err("expected redis or memory".to_string()),
        }
    }
}

/// Session storage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    /// Idle time after which a session's counter is forgotten.
    pub lifetime: Duration,
    /// Bound on sessions held in process memory.
    pub capacity: usize,
}

/// HTTP surface settings.
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// Key used to sign session cookies.
    pub secret_key: String,
    /// True when no `SECRET_KEY` was supplied and a random one was generated.
    pub secret_generated: bool,
    pub debug: bool,
    pub hostname: String,
    pub version: String,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_host", &self.bind_host)
            .field("port", &self.port)
            .field("secret_key", &"<redacted>")
            .field("secret_generated", &self.secret_generated)
            .field("debug", &self.debug)
            .field("hostname", &self.hostname)
            .field("version", &self.version)
            .finish()
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
}

impl RosterConfig {
    /// Build the configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `DATABASE_HOST`, `DATABASE_USER`, `DATABASE_PASSWORD`: required
    /// - `DATABASE_PORT` (default: 5432), `DATABASE_NAME` (default: company),
    ///   `DATABASE_TABLE` (default: employees)
    /// - `DATABASE_CONNECT_TIMEOUT_SECS` (default: 5), `DATABASE_QUERY_TIMEOUT_SECS` (default: 10)
    /// - `REDIS_HOST` (default: redis), `REDIS_PORT` (default: 6379), `REDIS_TIMEOUT_MS` (default: 500)
    /// - `SESSION_BACKEND` (default: redis), `SESSION_LIFETIME_SECS` (default: 31 days),
    ///   `SESSION_CAPACITY` (default: 100000)
    /// - `PORT` (default: 3000), `SECRET_KEY` (default: random per process)
    /// - `APP_DEBUG` (default: true), `HOSTNAME` (default: Unknown Host), `APP_VERSION` (default: 1.0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|&name| get(name).is_none())
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired { names: missing });
        }

        let required = |name: &str| get(name).unwrap_or_default();

        let database = DatabaseConfig {
            host: required("DATABASE_HOST"),
            user: required("DATABASE_USER"),
            password: required("DATABASE_PASSWORD"),
            port: parse_or(&get, "DATABASE_PORT", 5432)?,
            name: TableName::parse(
                "DATABASE_NAME",
                &get("DATABASE_NAME").unwrap_or_else(|| "company".to_string()),
            )?,
            table: TableName::parse(
                "DATABASE_TABLE",
                &get("DATABASE_TABLE").unwrap_or_else(|| "employees".to_string()),
            )?,
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            query_timeout: Duration::from_secs(parse_or(&get, "DATABASE_QUERY_TIMEOUT_SECS", 10)?),
        };

        let cache = CacheConfig {
            host: get("REDIS_HOST").unwrap_or_else(|| "redis".to_string()),
            port: parse_or(&get, "REDIS_PORT", 6379)?,
            timeout: Duration::from_millis(parse_or(&get, "REDIS_TIMEOUT_MS", 500)?),
            key: SHARED_CACHE_KEY.to_string(),
            ttl: SHARED_CACHE_TTL,
        };

        let lifetime_secs = parse_or(
            &get,
            "SESSION_LIFETIME_SECS",
            DEFAULT_SESSION_LIFETIME.as_secs(),
        )?;
        let capacity = parse_or(&get, "SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY)?;
        require_positive("SESSION_LIFETIME_SECS", lifetime_secs)?;
        require_positive("SESSION_CAPACITY", capacity as u64)?;
        let session = SessionConfig {
            backend: parse_or(&get, "SESSION_BACKEND", SessionBackend::Redis)?,
            lifetime: Duration::from_secs(lifetime_secs),
            capacity,
        };

        let (secret_key, secret_generated) = match get("SECRET_KEY") {
            Some(key) => (key, false),
            None => (
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
                true,
            ),
        };

        let server = ServerConfig {
            bind_host: "0.0.0.0".to_string(),
            port: parse_or(&get, "PORT", 3000)?,
            secret_key,
            secret_generated,
            debug: match get("APP_DEBUG") {
                Some(raw) => parse_flag("APP_DEBUG", &raw)?,
                None => true,
            },
            hostname: get("HOSTNAME").unwrap_or_else(|| "Unknown Host".to_string()),
            version: get("APP_VERSION").unwrap_or_else(|| "1.0".to_string()),
        };

        Ok(Self {
            database,
            cache,
            session,
            server,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn require_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: name.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
