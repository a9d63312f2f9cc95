//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::DEFAULT_MAX_TRANSFER;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Per-transfer ceiling, inclusive
    pub max_transfer_amount: Decimal,

    pub reconciliation: ReconciliationSettings,
}

/// Queue and retry settings for the ledger consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationSettings {
    /// Bounded queue capacity; enqueue fails once full
    pub queue_capacity: usize,

    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,

    /// Upper bound on a single retry delay
    pub backoff_max: Duration,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(30_000),
        }
    }
}

fn env_or<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env_or("DATABASE_MAX_CONNECTIONS", "10")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env_or("PORT", "3000")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let max_transfer_amount: Decimal =
            env_or("MAX_TRANSFER_AMOUNT", &DEFAULT_MAX_TRANSFER.to_string())?;
        if max_transfer_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue("MAX_TRANSFER_AMOUNT"));
        }

        let queue_capacity: usize = env_or("RECONCILIATION_QUEUE_CAPACITY", "10000")?;
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("RECONCILIATION_QUEUE_CAPACITY"));
        }

        let backoff_base = Duration::from_millis(env_or("RECONCILIATION_BACKOFF_BASE_MS", "100")?);
        let backoff_max = Duration::from_millis(env_or("RECONCILIATION_BACKOFF_MAX_MS", "30000")?);
        if backoff_base > backoff_max {
            return Err(ConfigError::InvalidValue("RECONCILIATION_BACKOFF_BASE_MS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            max_transfer_amount,
            reconciliation: ReconciliationSettings {
                queue_capacity,
                backoff_base,
                backoff_max,
            },
        })
    }

    /// Configuration for running without a database (tests, local tooling)
    pub fn in_memory() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 1,
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            max_transfer_amount: DEFAULT_MAX_TRANSFER,
            reconciliation: ReconciliationSettings::default(),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
