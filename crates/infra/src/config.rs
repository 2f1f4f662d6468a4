//! Process configuration read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::expiry::ExpirySchedulerConfig;
use crate::service::{DEFAULT_SWEEP_BATCH_SIZE, ServiceConfig};
use stockhold_inventory::DEFAULT_RESERVATION_TTL_SECS;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DATABASE_MAX_CONNECTIONS: &str = "STOCKHOLD_DATABASE_MAX_CONNECTIONS";
pub const ENV_RESERVATION_TTL_SECS: &str = "STOCKHOLD_RESERVATION_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "STOCKHOLD_SWEEP_INTERVAL_SECS";
pub const ENV_SWEEP_BATCH_SIZE: &str = "STOCKHOLD_SWEEP_BATCH_SIZE";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub reservation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS.unsigned_abs(),
            sweep_interval_secs: 60,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl AppConfig {
    /// Load from process environment variables; unset values take defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        config.database_url = string(ENV_DATABASE_URL);
        if let Some(n) = positive(ENV_DATABASE_MAX_CONNECTIONS, string(ENV_DATABASE_MAX_CONNECTIONS))? {
            config.database_max_connections = n;
        }
        if let Some(secs) = positive(ENV_RESERVATION_TTL_SECS, string(ENV_RESERVATION_TTL_SECS))? {
            config.reservation_ttl_secs = secs;
        }
        if let Some(secs) = positive(ENV_SWEEP_INTERVAL_SECS, string(ENV_SWEEP_INTERVAL_SECS))? {
            config.sweep_interval_secs = secs;
        }
        if let Some(n) = positive(ENV_SWEEP_BATCH_SIZE, string(ENV_SWEEP_BATCH_SIZE))? {
            config.sweep_batch_size = n;
        }
        Ok(config)
    }

    pub fn service(&self) -> ServiceConfig {
        let ttl_secs = i64::try_from(self.reservation_ttl_secs).unwrap_or(i64::MAX);
        ServiceConfig {
            reservation_ttl: chrono::Duration::try_seconds(ttl_secs)
                .unwrap_or(chrono::Duration::MAX),
            sweep_batch_size: self.sweep_batch_size,
        }
    }

    pub fn scheduler(&self) -> ExpirySchedulerConfig {
        ExpirySchedulerConfig::default()
            .with_wake_interval(Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Parse an optional value that must be a positive integer.
fn positive<T>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(v) if v != T::default() => Ok(Some(v)),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}
