//! Per-asset state machine
//!
//! `queued -> downloading -> done | failed`. A `done` asset is never fetched
//! again, which makes duplicate task delivery harmless.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::aggregator::JobAggregator;
use super::downloader::{DownloadError, Materializer};
use crate::db::{CatalogStore, StoreError};
use crate::models::{asset_storage_key, AssetStatus, DownloadResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// No such asset
    Missing,
    /// Already `done`
    Skipped,
    Done(DownloadResult),
    Failed { error: String },
}

/// Anything that stops an asset from reaching `done`
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

#[derive(Clone)]
pub struct AssetWorker {
    store: Arc<dyn CatalogStore>,
    materializer: Arc<dyn Materializer>,
    aggregator: JobAggregator,
}

impl AssetWorker {
    pub fn new(store: Arc<dyn CatalogStore>, materializer: Arc<dyn Materializer>) -> Self {
        let aggregator = JobAggregator::new(store.clone());
        Self {
            store,
            materializer,
            aggregator,
        }
    }

    /// Drive one asset to a terminal state and refresh its jobs.
    ///
    /// Returns `Err` only when the asset could not be loaded or the failure
    /// itself could not be recorded; the task should then be redelivered.
    #[instrument(skip(self))]
    pub async fn process(&self, asset_id: Uuid) -> Result<AssetOutcome, StoreError> {
        let Some(asset) = self.store.get_asset(asset_id).await? else {
            warn!("Asset not found, dropping task");
            return Ok(AssetOutcome::Missing);
        };

        if asset.status == AssetStatus::Done {
            info!("Asset already materialized, skipping");
            return Ok(AssetOutcome::Skipped);
        }

        let outcome = match self.attempt(asset_id, asset.link_id).await {
            Ok(result) => AssetOutcome::Done(result),
            Err(err) => {
                let report = error_report(&err);
                error!(error = %report, "Asset processing failed");
                self.store.mark_asset_failed(asset_id, &report).await?;
                AssetOutcome::Failed { error: report }
            },
        };

        match self.store.jobs_for_asset(asset_id).await {
            Ok(job_ids) => {
                for job_id in job_ids {
                    if let Err(err) = self.aggregator.refresh(job_id).await {
                        warn!(job_id = %job_id, "Failed to refresh job: {}", err);
                    }
                }
            },
            Err(err) => warn!("Failed to look up jobs for asset: {}", err),
        }

        Ok(outcome)
    }

    async fn attempt(&self, asset_id: Uuid, link_id: Uuid) -> Result<DownloadResult, AttemptError> {
        let link = self
            .store
            .get_link(link_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Link", link_id))?;

        self.store.mark_asset_downloading(asset_id).await?;

        let key = asset_storage_key(&link.record_idn, asset_id);
        let result = self.materializer.materialize(&link.url, &key).await?;
        self.store.mark_asset_done(asset_id, &result).await?;

        Ok(result)
    }
}

/// An error's message followed by its source chain
pub fn error_report(err: &dyn std::error::Error) -> String {
    let mut report = err.to_string();
    let mut source = err.source();
    if source.is_some() {
        report.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        report.push_str(&format!("\n    {}: {}", depth, cause));
        depth += 1;
        source = cause.source();
    }
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::JobStatus;
    use crate::testing::{seed_record, StubMaterializer};

    #[tokio::test]
    async fn test_missing_asset() {
        let worker = AssetWorker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubMaterializer::succeeding()),
        );
        assert_eq!(worker.process(Uuid::new_v4()).await.unwrap(), AssetOutcome::Missing);
    }

    #[tokio::test]
    async fn test_success_stores_metadata_and_completes_job() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "42", 1).await;
        let (job, assets) = store.create_job(&links).await.unwrap();
        let materializer = Arc::new(StubMaterializer::succeeding());
        let worker = AssetWorker::new(store.clone(), materializer.clone());

        let outcome = worker.process(assets[0].id).await.unwrap();

        let expected_key = format!("42/{}", assets[0].id);
        assert!(matches!(&outcome, AssetOutcome::Done(r) if r.storage_key == expected_key));
        assert_eq!(materializer.calls(), vec![(links[0].url.clone(), expected_key.clone())]);

        let asset = store.get_asset(assets[0].id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Done);
        assert_eq!(asset.storage_key.as_deref(), Some(expected_key.as_str()));
        assert!(asset.sha256.is_some());
        assert!(asset.error.is_none());

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_done_asset_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "42", 1).await;
        let (_, assets) = store.create_job(&links).await.unwrap();
        let materializer = Arc::new(StubMaterializer::succeeding());
        let worker = AssetWorker::new(store.clone(), materializer.clone());

        worker.process(assets[0].id).await.unwrap();
        let before = store.get_asset(assets[0].id).await.unwrap().unwrap();

        assert_eq!(worker.process(assets[0].id).await.unwrap(), AssetOutcome::Skipped);
        assert_eq!(materializer.calls().len(), 1);
        assert_eq!(store.get_asset(assets[0].id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_failure_records_report_with_cause() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "42", 2).await;
        let (job, assets) = store.create_job(&links).await.unwrap();
        let worker = AssetWorker::new(store.clone(), Arc::new(StubMaterializer::failing()));

        let outcome = worker.process(assets[0].id).await.unwrap();
        let AssetOutcome::Failed { error } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("5 attempt(s)"));
        assert!(error.contains("Caused by:"));
        assert!(error.contains("HTTP 500"));

        let asset = store.get_asset(assets[0].id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        assert_eq!(asset.error.as_deref(), Some(error.as_str()));

        // The second asset is still queued
        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_failed_asset_can_be_retried() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "42", 1).await;
        let (_, assets) = store.create_job(&links).await.unwrap();

        AssetWorker::new(store.clone(), Arc::new(StubMaterializer::failing()))
            .process(assets[0].id)
            .await
            .unwrap();

        let outcome = AssetWorker::new(store.clone(), Arc::new(StubMaterializer::succeeding()))
            .process(assets[0].id)
            .await
            .unwrap();

        assert!(matches!(outcome, AssetOutcome::Done(_)));
        let asset = store.get_asset(assets[0].id).await.unwrap().unwrap();
        assert!(asset.error.is_none());
    }

    #[tokio::test]
    async fn test_store_error_after_upload_marks_failed() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "42", 1).await;
        let (job, assets) = store.create_job(&links).await.unwrap();
        store.fail_completions(true);
        let worker = AssetWorker::new(store.clone(), Arc::new(StubMaterializer::succeeding()));

        let outcome = worker.process(assets[0].id).await.unwrap();

        let AssetOutcome::Failed { error } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(error.contains("Database query failed"));

        let asset = store.get_asset(assets[0].id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        assert_eq!(asset.error.as_deref(), Some(error.as_str()));

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_link_marks_failed() {
        let store = Arc::new(MemoryStore::new());
        let mut links = seed_record(&store, "42", 1).await;
        links[0].id = Uuid::new_v4();
        let (job, assets) = store.create_job(&links).await.unwrap();
        let materializer = Arc::new(StubMaterializer::succeeding());
        let worker = AssetWorker::new(store.clone(), materializer.clone());

        let outcome = worker.process(assets[0].id).await.unwrap();

        assert!(matches!(&outcome, AssetOutcome::Failed { error } if error.contains("not found")));
        assert!(materializer.calls().is_empty());
        let asset = store.get_asset(assets[0].id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_error_report_lists_chain() {
        let err = DownloadError::Exhausted {
            attempts: 2,
            last: Box::new(DownloadError::SizeLimit { limit: 10 }),
        };
        assert_eq!(
            error_report(&err),
            "Download failed after 2 attempt(s): Download exceeds the limit of 10 bytes\n\n\
             Caused by:\n    0: Download exceeds the limit of 10 bytes"
        );
    }
}
