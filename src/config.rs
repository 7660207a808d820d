//! Service configuration from the environment

use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_AUTH_USER_HEADER: &str = "x-authenticated-user-id";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` runs on the in-memory ledger.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub lock_timeout: Duration,
    /// Header an upstream authenticating proxy sets to the customer id.
    pub auth_user_header: String,
    /// Idle time after which a cart session is dropped.
    pub session_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            nats_url: None,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            auth_user_header: DEFAULT_AUTH_USER_HEADER.to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, "PORT", DEFAULT_PORT)?;
        let max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", reason: "must be at least 1".into() });
        }
        let lock_timeout_ms = parse_or(&get, "CHECKOUT_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid { var: "CHECKOUT_LOCK_TIMEOUT_MS", reason: "must be at least 1".into() });
        }
        let session_ttl_secs = parse_or(&get, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::Invalid { var: "SESSION_TTL_SECS", reason: "must be at least 1".into() });
        }
        let auth_user_header = get("AUTH_USER_HEADER").unwrap_or_else(|| DEFAULT_AUTH_USER_HEADER.to_string()).to_ascii_lowercase();
        if axum::http::HeaderName::from_bytes(auth_user_header.as_bytes()).is_err() {
            return Err(ConfigError::Invalid { var: "AUTH_USER_HEADER", reason: format!("'{}' is not a header name", auth_user_header) });
        }

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            max_connections,
            nats_url: get("NATS_URL"),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            auth_user_header,
            session_ttl: Duration::from_secs(session_ttl_secs),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid { var, reason: e.to_string() }),
        None => Ok(default),
    }
}
