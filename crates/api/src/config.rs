//! Process configuration, read from environment variables.

use std::time::Duration;

use thiserror::Error;

use gatehouse_auth::PasswordHasher;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_TOKEN_TTL_HOURS: u32 = 10;
/// One year.
pub const MAX_TOKEN_TTL_HOURS: u32 = 24 * 365;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub addr: String,
    /// Absent means the in-memory store (dev/tests only).
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: u32,
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("store_timeout", &self.store_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev = get("GATEHOUSE_DEV").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if dev => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        Ok(Self {
            addr: get("APP_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            jwt_secret,
            token_ttl_hours: parse_or("TOKEN_TTL_HOURS", get("TOKEN_TTL_HOURS"), DEFAULT_TOKEN_TTL_HOURS)?,
            store_timeout: Duration::from_secs(parse_or(
                "STORE_TIMEOUT_SECS",
                get("STORE_TIMEOUT_SECS"),
                DEFAULT_STORE_TIMEOUT_SECS,
            )?),
            bcrypt_cost: parse_or("BCRYPT_COST", get("BCRYPT_COST"), PasswordHasher::default().cost())?,
        })
        .and_then(Self::checked)
    }

    /// In-memory store, cheap hashing. Used by the integration tests.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            addr: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt_secret: jwt_secret.into(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            bcrypt_cost: 4,
        }
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_HOURS",
                value: self.token_ttl_hours.to_string(),
                reason: format!("must be between 1 and {MAX_TOKEN_TTL_HOURS}"),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "STORE_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
