//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("JWT_SECRET must be at least 32 bytes")]
    WeakSecret,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub event_subject_prefix: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::WeakSecret);
        }
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            event_subject_prefix: lookup("EVENT_SUBJECT_PREFIX").unwrap_or_else(|| "orderdesk".to_string()),
            jwt_secret,
            token_ttl: Duration::from_secs(parse_or(&lookup, "TOKEN_TTL_SECS", 86_400)?),
            port: parse_or(&lookup, "PORT", 8083)?,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}
