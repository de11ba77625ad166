use crate::error::{OutboxError, OutboxResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

/// Relay tuning: how often to tick, how much to claim, how long one publish may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> OutboxResult<()> {
        if self.interval.is_zero() {
            return Err(OutboxError::Config("relay interval must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(OutboxError::Config("relay batch size must be greater than zero".into()));
        }
        if self.publish_timeout.is_zero() {
            return Err(OutboxError::Config("publish timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    pub fn from_env() -> Self {
        match env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string())
            .to_lowercase()
            .as_str()
        {
            "nats" => BusType::Nats,
            "inmemory" => BusType::InMemory,
            other => {
                tracing::warn!(bus_type = %other, "Unknown BUS_TYPE, defaulting to inmemory");
                BusType::InMemory
            }
        }
    }
}

/// Connection pool sizing, see [`crate::db::init_pool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: BusType,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub pool: PoolConfig,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> OutboxResult<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| OutboxError::Config("DATABASE_URL must be set".to_string()))?;

        let bus_type = BusType::from_env();
        let nats_url = match bus_type {
            BusType::Nats => Some(
                env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            ),
            BusType::InMemory => None,
        };
        let nats_subject_prefix = env::var("NATS_SUBJECT_PREFIX").unwrap_or_default();

        let pool = PoolConfig {
            max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", 0)?,
            acquire_timeout: Duration::from_secs(parse_env("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
        };

        let relay = RelayConfig {
            interval: Duration::from_secs(parse_env(
                "OUTBOX_INTERVAL_SECS",
                DEFAULT_INTERVAL_SECS,
            )?),
            batch_size: parse_env("OUTBOX_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            publish_timeout: Duration::from_millis(parse_env(
                "OUTBOX_PUBLISH_TIMEOUT_MS",
                DEFAULT_PUBLISH_TIMEOUT_MS,
            )?),
        };
        relay.validate()?;

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            nats_subject_prefix,
            pool,
            relay,
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> OutboxResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| OutboxError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}
