use std::time::Duration;

use renderq_core::dispatch::{
    CLEANUP_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT, GENERATE_TIMEOUT,
    SUBMIT_TIMEOUT,
};
use renderq_core::task::DEFAULT_RETENTION_DAYS;
use renderq_providers::BalanceStrategy;
use renderq_worker::PoolConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-signal cleanup (pool drain, background loops).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }
}

/// Task dispatch configuration: providers, pool sizing, and retention.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base URLs of the image generation servers.
    pub provider_urls: Vec<String>,
    pub strategy: BalanceStrategy,
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Terminal tasks older than this are purged by the cleanup job.
    pub retention_days: i64,
    pub cleanup_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provider_urls: vec!["http://localhost:8000".to_string()],
            strategy: BalanceStrategy::RoundRobin,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retention_days: DEFAULT_RETENTION_DAYS,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }
}

impl DispatchConfig {
    /// Load dispatch settings from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `IMAGE_PROVIDER_URLS`        | `http://localhost:8000`  |
    /// | `BALANCE_STRATEGY`           | `round-robin`            |
    /// | `WORKER_COUNT`               | `2`                      |
    /// | `QUEUE_CAPACITY`             | `100`                    |
    /// | `TASK_RETENTION_DAYS`        | `7`                      |
    /// | `TASK_CLEANUP_INTERVAL_SECS` | `3600`                   |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let provider_urls = std::env::var("IMAGE_PROVIDER_URLS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.provider_urls);

        let strategy = match std::env::var("BALANCE_STRATEGY") {
            Ok(v) => v
                .parse()
                .unwrap_or_else(|e| panic!("BALANCE_STRATEGY is invalid: {e}")),
            Err(_) => defaults.strategy,
        };

        let worker_count: usize = std::env::var("WORKER_COUNT")
            .map(|v| v.parse().expect("WORKER_COUNT must be a valid usize"))
            .unwrap_or(defaults.worker_count);

        let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
            .map(|v| v.parse().expect("QUEUE_CAPACITY must be a valid usize"))
            .unwrap_or(defaults.queue_capacity);

        let retention_days: i64 = std::env::var("TASK_RETENTION_DAYS")
            .map(|v| v.parse().expect("TASK_RETENTION_DAYS must be a valid i64"))
            .unwrap_or(defaults.retention_days);

        let cleanup_interval = std::env::var("TASK_CLEANUP_INTERVAL_SECS")
            .map(|v| {
                Duration::from_secs(
                    v.parse()
                        .expect("TASK_CLEANUP_INTERVAL_SECS must be a valid u64"),
                )
            })
            .unwrap_or(defaults.cleanup_interval);

        Self {
            provider_urls,
            strategy,
            worker_count,
            queue_capacity,
            retention_days,
            cleanup_interval,
        }
    }

    /// Worker pool settings derived from this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            submit_timeout: SUBMIT_TIMEOUT,
            generate_timeout: GENERATE_TIMEOUT,
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
