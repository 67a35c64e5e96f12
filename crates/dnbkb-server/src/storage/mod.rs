//! Object storage for materialized assets
//!
//! [`ObjectStore`] is the seam the download worker and the presign endpoint talk
//! to. [`S3Storage`] targets S3 or MinIO; [`memory::MemoryObjectStore`] keeps
//! objects in process for tests and local runs.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use memory::MemoryObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read local file: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 {operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid presign expiry: {0}")]
    Presign(String),
}

impl StorageError {
    fn request(operation: &'static str, err: impl std::error::Error) -> Self {
        Self::Request {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist; losing a creation race is not an error
    async fn ensure_bucket(&self) -> StorageResult<()>;

    /// Upload a local file under `key`
    async fn put_file(&self, key: &str, path: &Path, content_type: Option<&str>)
        -> StorageResult<()>;

    /// A time-limited GET URL for `key`
    async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    bucket_ready: Arc<OnceCell<()>>,
}

impl S3Storage {
    pub fn new(config: config::StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "dnbkb-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            "Storage client initialized"
        );

        Self {
            client,
            bucket: config.bucket,
            bucket_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_bucket_if_missing(&self) -> StorageResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "Created bucket");
                Ok(())
            },
            Err(err) => {
                let raced = err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists())
                    .unwrap_or(false);
                if raced {
                    debug!(bucket = %self.bucket, "Bucket created concurrently");
                    Ok(())
                } else {
                    Err(StorageError::request("CreateBucket", err))
                }
            },
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn ensure_bucket(&self) -> StorageResult<()> {
        self.bucket_ready
            .get_or_try_init(|| self.create_bucket_if_missing())
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, path), fields(bucket = %self.bucket))]
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.ensure_bucket().await?;

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::request("PutObject", e))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::request("PutObject", e))?;

        info!("Uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::request("GetObject presign", e))?;

        Ok(presigned_request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_presign_is_offline() {
        let storage = S3Storage::new(config::StorageConfig::for_minio(
            "http://localhost:9000",
            "test-bucket",
        ));

        let url = storage
            .presigned_get("123/abc", Duration::from_secs(900))
            .await
            .unwrap_or_default();

        assert!(url.starts_with("http://localhost:9000/test-bucket/123/abc"));
        assert!(url.contains("X-Amz-Expires=900"));
    }

    #[tokio::test]
    async fn test_presign_rejects_excessive_expiry() {
        let storage = S3Storage::new(config::StorageConfig::default());
        let result = storage
            .presigned_get("k", Duration::from_secs(8 * 24 * 3600))
            .await;
        assert!(matches!(result, Err(StorageError::Presign(_))));
    }
}
