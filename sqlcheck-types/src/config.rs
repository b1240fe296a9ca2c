//! Explicit configuration, loaded once per process and passed into a root
//! `Core` struct rather than read ambiently. Covers the shared root, database
//! URL, per-dialect defaults, and the worker's retry/timeout/concurrency
//! knobs, without the Celery/Redis/Consul fields this workspace has no use
//! for.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "dev" => Some(Environment::Dev),
            "test" => Some(Environment::Test),
            "prod" => Some(Environment::Prod),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub shared_root: PathBuf,
    pub database_url: String,
    pub dialect_default: String,
    pub max_file_bytes: u64,
    pub max_archive_entries: usize,
    pub worker_concurrency: usize,
    pub task_lock_ttl_seconds: u64,
    pub task_retry_max: u32,
    pub task_retry_base_backoff_seconds: u64,
    pub task_soft_timeout_seconds: u64,
    pub task_hard_timeout_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub bus_poll_interval_ms: u64,
    pub api_bind_addr: SocketAddr,
}

impl Config {
    /// Load configuration from the process environment. Missing
    /// `SHARED_ROOT` / `DATABASE_URL` are fatal; everything else falls back
    /// to documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let shared_root = require_env("SHARED_ROOT")?;
        let database_url = require_env("DATABASE_URL")?;

        let environment = std::env::var("ENVIRONMENT")
            .ok()
            .map(|v| {
                Environment::parse(&v).ok_or(ConfigError::Invalid {
                    name: "ENVIRONMENT",
                    value: v,
                })
            })
            .transpose()?
            .unwrap_or(Environment::Dev);

        Ok(Config {
            environment,
            shared_root: PathBuf::from(shared_root),
            database_url,
            dialect_default: env_or("DIALECT_DEFAULT", "ansi"),
            max_file_bytes: env_parse_or("MAX_FILE_BYTES", 50 * 1024 * 1024)?,
            max_archive_entries: env_parse_or("MAX_ARCHIVE_ENTRIES", 1000)?,
            worker_concurrency: env_parse_or("WORKER_CONCURRENCY", 4)?,
            task_lock_ttl_seconds: env_parse_or("TASK_LOCK_TTL_SECONDS", 300)?,
            task_retry_max: env_parse_or("TASK_RETRY_MAX", 3)?,
            task_retry_base_backoff_seconds: env_parse_or("TASK_RETRY_BASE_BACKOFF_SECONDS", 60)?,
            task_soft_timeout_seconds: env_parse_or("TASK_SOFT_TIMEOUT_SECONDS", 1800)?,
            task_hard_timeout_seconds: env_parse_or("TASK_HARD_TIMEOUT_SECONDS", 2100)?,
            heartbeat_interval_seconds: env_parse_or("HEARTBEAT_INTERVAL_SECONDS", 30)?,
            bus_poll_interval_ms: env_parse_or("BUS_POLL_INTERVAL_MS", 250)?,
            api_bind_addr: env_or("API_BIND_ADDR", "0.0.0.0:8000")
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    name: "API_BIND_ADDR",
                    value: env_or("API_BIND_ADDR", "0.0.0.0:8000"),
                })?,
        })
    }

    pub fn task_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.task_lock_ttl_seconds)
    }

    pub fn task_soft_timeout(&self) -> Duration {
        Duration::from_secs(self.task_soft_timeout_seconds)
    }

    pub fn task_hard_timeout(&self) -> Duration {
        Duration::from_secs(self.task_hard_timeout_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn bus_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bus_poll_interval_ms)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.task_retry_base_backoff_seconds * 2u64.saturating_pow(attempt))
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_doubles_per_attempt() {
        // Can't touch global env in parallel tests, so construct directly.
        let cfg = Config {
            environment: Environment::Dev,
            shared_root: PathBuf::from("/tmp"),
            database_url: "postgres://localhost/test".into(),
            dialect_default: "ansi".into(),
            max_file_bytes: 1,
            max_archive_entries: 1,
            worker_concurrency: 1,
            task_lock_ttl_seconds: 300,
            task_retry_max: 3,
            task_retry_base_backoff_seconds: 60,
            task_soft_timeout_seconds: 1800,
            task_hard_timeout_seconds: 2100,
            heartbeat_interval_seconds: 30,
            bus_poll_interval_ms: 250,
            api_bind_addr: "0.0.0.0:8000".parse().unwrap(),
        };
        assert_eq!(cfg.retry_backoff(0), Duration::from_secs(60));
        assert_eq!(cfg.retry_backoff(1), Duration::from_secs(120));
        assert_eq!(cfg.retry_backoff(2), Duration::from_secs(240));
    }
}
