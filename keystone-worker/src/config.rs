//! Worker configuration
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` (required) and `DATABASE_MAX_CONNECTIONS`
//! - `EMAIL_API_URL`, `EMAIL_API_KEY`, `EMAIL_FROM`: provider; log-only when unset
//! - `APP_URL`: public frontend URL used in email links
//! - `WORKER_POLL_INTERVAL_SECS` (default 5)
//! - `WORKER_BATCH_SIZE` (default 10)
//! - `JOB_MAX_ATTEMPTS` (default 3)
//! - `JOB_RETRY_DELAY_SECS` (default 300)

use keystone_shared::{
    config::{EmailConfig, Source},
    db::pool::DatabaseConfig,
};
use std::time::Duration;

use crate::{orchestrator::OrchestratorConfig, queue::RetryPolicy};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub app_url: String,
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryPolicy,
}

fn parse_or<T>(source: Source<'_>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match source(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

impl OrchestratorConfig {
    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let poll_interval_secs = parse_or(source, "WORKER_POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?;
        let batch_size = parse_or(source, "WORKER_BATCH_SIZE", defaults.batch_size)?;

        if poll_interval_secs == 0 {
            anyhow::bail!("WORKER_POLL_INTERVAL_SECS must be at least 1");
        }
        if batch_size == 0 {
            anyhow::bail!("WORKER_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
            ..defaults
        })
    }
}

impl RetryPolicy {
    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let max_attempts = parse_or(source, "JOB_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts < 1 {
            anyhow::bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }

        let retry_delay_secs = parse_or(source, "JOB_RETRY_DELAY_SECS", defaults.retry_delay.num_seconds())?;
        if retry_delay_secs < 0 {
            anyhow::bail!("JOB_RETRY_DELAY_SECS must not be negative");
        }

        Ok(Self {
            max_attempts,
            retry_delay: chrono::Duration::seconds(retry_delay_secs),
        })
    }
}

impl WorkerConfig {
    /// Loads configuration from the environment, reading `.env` first when
    /// present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let source = |key: &str| std::env::var(key).ok();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            email: EmailConfig::from_env()?,
            app_url: source("APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            orchestrator: OrchestratorConfig::from_source(&source)?,
            retry: RetryPolicy::from_source(&source)?,
        })
    }
}
