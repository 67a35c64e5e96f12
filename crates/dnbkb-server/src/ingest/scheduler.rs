//! Job scheduler
//!
//! Runs the apalis worker that consumes [`IngestAssetTask`]s from PostgreSQL.

use anyhow::Result;
use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::IngestConfig;
use super::queue::IngestAssetTask;
use super::worker::{AssetOutcome, AssetWorker};

/// Job scheduler
pub struct JobScheduler {
    config: IngestConfig,
    db: PgPool,
    worker: AssetWorker,
}

impl JobScheduler {
    pub fn new(config: IngestConfig, db: PgPool, worker: AssetWorker) -> Self {
        Self { config, db, worker }
    }

    /// Create the apalis tables if needed and start the worker
    pub async fn start(self) -> Result<JoinHandle<()>> {
        info!("Starting job scheduler");

        let storage = self.setup_storage().await?;
        let concurrency = self.config.worker_concurrency;
        let worker = self.worker;

        info!("Job scheduler initialized with {} concurrent downloads", concurrency);

        let handle = tokio::spawn(async move {
            info!("Job worker started");
            if let Err(e) = Monitor::new()
                .register(move |_index| {
                    WorkerBuilder::new("dnbkb-asset-worker")
                        .backend(storage.clone())
                        .concurrency(concurrency)
                        .data(worker.clone())
                        .build(process_asset_task)
                })
                .run()
                .await
            {
                error!("Job worker error: {:?}", e);
            }
            info!("Job worker stopped");
        });

        Ok(handle)
    }

    async fn setup_storage(&self) -> Result<PostgresStorage<IngestAssetTask>> {
        info!("Setting up PostgreSQL storage for apalis");
        PostgresStorage::setup(&self.db).await?;
        Ok(PostgresStorage::new(&self.db))
    }
}

/// Handle one queued asset task
///
/// Download failures are recorded on the asset and do not fail the task;
/// only persistence errors are reported back to apalis.
async fn process_asset_task(task: IngestAssetTask, worker: Data<AssetWorker>) -> Result<()> {
    info!(asset_id = %task.asset_id, enqueued_at = %task.enqueued_at, "Processing asset task");

    match worker.process(task.asset_id).await? {
        AssetOutcome::Missing => warn!(asset_id = %task.asset_id, "Task for unknown asset"),
        AssetOutcome::Skipped => info!(asset_id = %task.asset_id, "Asset already done"),
        AssetOutcome::Done(result) => {
            info!(asset_id = %task.asset_id, key = %result.storage_key, "Asset done")
        },
        AssetOutcome::Failed { .. } => warn!(asset_id = %task.asset_id, "Asset failed"),
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::testing::StubMaterializer;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_job_scheduler_new() {
        let config = IngestConfig::default();
        let db = PgPool::connect_lazy("postgresql://localhost/test").unwrap();
        let worker = AssetWorker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubMaterializer::succeeding()),
        );
        let scheduler = JobScheduler::new(config.clone(), db, worker);

        assert_eq!(scheduler.config.worker_concurrency, config.worker_concurrency);
    }
}
