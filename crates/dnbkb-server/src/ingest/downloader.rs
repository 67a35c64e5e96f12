//! Asset downloader
//!
//! Streams a remote file into a temporary file while hashing and counting
//! bytes, then uploads it to object storage. Each attempt passes the URL
//! safety gate first; failed attempts are retried with exponential backoff.

use async_trait::async_trait;
use dnbkb_common::checksum::StreamingDigest;
use reqwest::{header::CONTENT_TYPE, redirect, Client};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::config::{IngestConfig, RetryPolicy};
use super::url_safety::{GatedResolver, UnsafeUrlError, UrlSafetyGate};
use crate::models::DownloadResult;
use crate::storage::{ObjectStore, StorageError};

const MAX_REDIRECTS: usize = 10;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Unsafe URL: {0}")]
    UnsafeUrl(#[from] UnsafeUrlError),

    #[error("Redirect rejected: {0}")]
    UnsafeRedirect(String),

    #[error("Connection refused by URL policy: {0}")]
    UnsafeConnection(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Download exceeds the limit of {limit} bytes")]
    SizeLimit { limit: u64 },

    #[error("Temporary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Download failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Failures that repeat identically on every attempt
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::UnsafeUrl(_)
            | Self::UnsafeRedirect(_)
            | Self::UnsafeConnection(_)
            | Self::SizeLimit { .. } => true,
            Self::Exhausted { last, .. } => last.is_rejection(),
            _ => false,
        }
    }

    /// A reqwest error raised by the redirect policy or the gated resolver
    /// carries the gate's verdict somewhere in its source chain
    fn from_request(err: reqwest::Error) -> Self {
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(unsafe_url) = inner.downcast_ref::<UnsafeUrlError>() {
                return if err.is_redirect() {
                    Self::UnsafeRedirect(unsafe_url.to_string())
                } else {
                    Self::UnsafeConnection(unsafe_url.to_string())
                };
            }
            source = inner.source();
        }
        Self::Http(err)
    }
}

/// Fetches a URL into object storage under a key
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(&self, url: &str, key: &str) -> Result<DownloadResult, DownloadError>;
}

pub struct Downloader {
    client: Client,
    gate: UrlSafetyGate,
    objects: Arc<dyn ObjectStore>,
    max_bytes: u64,
    retry: RetryPolicy,
    temp_dir: Option<PathBuf>,
}

impl Downloader {
    pub fn new(config: &IngestConfig, objects: Arc<dyn ObjectStore>) -> Result<Self, DownloadError> {
        Self::with_gate(
            config,
            UrlSafetyGate::new(config.allow_private_addresses),
            objects,
        )
    }

    pub fn with_gate(
        config: &IngestConfig,
        gate: UrlSafetyGate,
        objects: Arc<dyn ObjectStore>,
    ) -> Result<Self, DownloadError> {
        let redirect_gate = gate.clone();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match redirect_gate.check_redirect(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(err) => attempt.error(err),
            }
        });

        let mut builder = Client::builder()
            .timeout(config.http_timeout())
            .redirect(policy)
            .user_agent(concat!("dnbkb/", env!("CARGO_PKG_VERSION")));
        if !gate.allows_private() {
            builder = builder.dns_resolver(Arc::new(GatedResolver::new(gate.clone())));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            gate,
            objects,
            max_bytes: config.max_download_bytes,
            retry: config.retry.clone(),
            temp_dir: config.temp_dir.clone(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn should_retry(&self, err: &DownloadError) -> bool {
        self.retry.retry_rejections || !err.is_rejection()
    }

    /// One attempt: gate, GET, stream to disk, upload
    async fn attempt(&self, url: &str, key: &str) -> Result<DownloadResult, DownloadError> {
        let target = self.gate.assert_safe(url).await?;

        let mut response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(DownloadError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(DownloadError::SizeLimit {
                limit: self.max_bytes,
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Removed on drop, whichever way this function returns
        let temp = match &self.temp_dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new()?,
        };
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut digest = StreamingDigest::new();

        while let Some(chunk) = response.chunk().await.map_err(DownloadError::from_request)? {
            digest.update(&chunk);
            if digest.bytes_seen() > self.max_bytes {
                return Err(DownloadError::SizeLimit {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let size_bytes = digest.bytes_seen();
        let sha256 = digest.finalize_hex();
        debug!(key, size_bytes, "Download buffered, uploading");

        self.objects
            .put_file(key, temp.path(), mime_type.as_deref())
            .await?;

        Ok(DownloadResult {
            storage_key: key.to_string(),
            sha256,
            mime_type,
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
        })
    }
}

#[async_trait]
impl Materializer for Downloader {
    #[instrument(skip(self), fields(max_attempts = self.retry.max_attempts))]
    async fn materialize(&self, url: &str, key: &str) -> Result<DownloadResult, DownloadError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(url, key).await {
                Ok(result) => {
                    info!(
                        attempt,
                        size_bytes = result.size_bytes,
                        sha256 = %result.sha256,
                        "Asset materialized"
                    );
                    return Ok(result);
                },
                Err(err) => {
                    warn!("Download attempt {}/{} failed: {}", attempt, max_attempts, err);

                    if attempt >= max_attempts || !self.should_retry(&err) {
                        return Err(DownloadError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let backoff = self.retry.backoff_after(attempt);
                    debug!("Retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
            }
        }
    }
}
