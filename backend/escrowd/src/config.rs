//! Application configuration loaded from environment variables.

use std::str::FromStr;

use blockfund_escrow::config::{
    DEFAULT_MAX_NAME_LEN, DEFAULT_MAX_NOTE_LEN, DEFAULT_MAX_PHASES_PER_PROJECT,
    DEFAULT_MAX_SUMMARY_LEN,
};
use blockfund_escrow::EngineConfig;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding the event journal
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the sweeper settles expired projects
    pub settle_interval_secs: u64,
    /// Upper bound on pooled SQLite connections
    pub db_max_connections: u32,
    /// Limits handed to the escrow engine
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./blockfund_events.db".to_string()),
            api_port: parse_or("API_PORT", 3001)?,
            settle_interval_secs: parse_or("SETTLE_INTERVAL_SECS", 5)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5)?,
            engine: EngineConfig {
                max_name_len: parse_or("MAX_NAME_LEN", DEFAULT_MAX_NAME_LEN)?,
                max_summary_len: parse_or("MAX_SUMMARY_LEN", DEFAULT_MAX_SUMMARY_LEN)?,
                max_note_len: parse_or("MAX_NOTE_LEN", DEFAULT_MAX_NOTE_LEN)?,
                max_phases_per_project: parse_or(
                    "MAX_PHASES_PER_PROJECT",
                    DEFAULT_MAX_PHASES_PER_PROJECT,
                )?,
            },
        };
        if config.settle_interval_secs == 0 {
            return Err(ServiceError::Config(
                "SETTLE_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if config.db_max_connections == 0 {
            return Err(ServiceError::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        config
            .engine
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(config)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}

/// Parse `key` if set, otherwise fall back to `default`.
fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServiceError::Config(format!("Invalid {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}
