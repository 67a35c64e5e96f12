//! Ingestion configuration
//!
//! Download limits, retry policy and worker pool settings (`INGEST_*` and
//! related environment variables).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{env_or, DEFAULT_HTTP_TIMEOUT_SECS};

/// 50 MiB
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
pub const DEFAULT_PRESIGN_EXPIRY_MINUTES: u64 = 15;

/// Retry schedule for one asset download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
    /// Also retry safety and size rejections, which fail the same way every time
    pub retry_rejections: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            retry_rejections: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before the attempt following `attempt` (1-based): 1s, 2s, 4s, ... capped
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Which queue backend carries asset tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Durable apalis storage in PostgreSQL
    #[default]
    Postgres,
    /// Tokio tasks inside the server process
    Local,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(QueueBackend::Postgres),
            "local" | "memory" => Ok(QueueBackend::Local),
            other => Err(format!("Invalid queue backend: {}", other)),
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub max_download_bytes: u64,
    pub http_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Upper bound on concurrently running downloads
    pub worker_concurrency: usize,
    pub queue: QueueBackend,
    /// Run workers in this process
    pub worker_enabled: bool,
    /// Skip the private/reserved address checks; development only
    pub allow_private_addresses: bool,
    pub presign_expiry_minutes: u64,
    /// Directory for download buffers; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            queue: QueueBackend::default(),
            worker_enabled: true,
            allow_private_addresses: false,
            presign_expiry_minutes: DEFAULT_PRESIGN_EXPIRY_MINUTES,
            temp_dir: None,
        }
    }
}

impl IngestConfig {
    /// Load from environment variables on top of the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: env_or("INGEST_MAX_ATTEMPTS", defaults.retry.max_attempts),
            initial_backoff: Duration::from_millis(env_or(
                "INGEST_BACKOFF_INITIAL_MS",
                DEFAULT_BACKOFF_INITIAL_MS,
            )),
            multiplier: env_or("INGEST_BACKOFF_MULTIPLIER", DEFAULT_BACKOFF_MULTIPLIER),
            max_backoff: Duration::from_millis(env_or("INGEST_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)),
            retry_rejections: env_or("INGEST_RETRY_REJECTIONS", defaults.retry.retry_rejections),
        };

        Self {
            max_download_bytes: env_or("MAX_DOWNLOAD_BYTES", defaults.max_download_bytes),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECONDS", defaults.http_timeout_secs),
            retry,
            worker_concurrency: env_or("INGEST_WORKER_CONCURRENCY", defaults.worker_concurrency),
            queue: env_or("INGEST_QUEUE", defaults.queue),
            worker_enabled: env_or("INGEST_WORKER_ENABLED", defaults.worker_enabled),
            allow_private_addresses: env_or(
                "INGEST_ALLOW_PRIVATE_ADDRESSES",
                defaults.allow_private_addresses,
            ),
            presign_expiry_minutes: env_or(
                "PRESIGN_EXPIRY_MINUTES",
                defaults.presign_expiry_minutes,
            ),
            temp_dir: std::env::var("INGEST_TEMP_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_download_bytes == 0 {
            anyhow::bail!("MAX_DOWNLOAD_BYTES must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("INGEST_MAX_ATTEMPTS must be at least 1");
        }
        if self.worker_concurrency == 0 {
            anyhow::bail!("INGEST_WORKER_CONCURRENCY must be at least 1");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECONDS must be greater than 0");
        }
        // Presigned S3 URLs cannot outlive seven days
        if self.presign_expiry_minutes == 0 || self.presign_expiry_minutes > 7 * 24 * 60 {
            anyhow::bail!("PRESIGN_EXPIRY_MINUTES must be between 1 and 10080");
        }
        if self.allow_private_addresses {
            tracing::warn!("Private address checks are disabled for asset downloads");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_minutes * 60)
    }
}
