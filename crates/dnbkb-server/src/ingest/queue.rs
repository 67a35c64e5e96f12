//! Asset task queue
//!
//! One [`IngestAssetTask`] per asset. [`PostgresDispatcher`] pushes onto the
//! durable apalis queue consumed by [`super::scheduler::JobScheduler`];
//! [`LocalDispatcher`] runs tasks on tokio inside the server process.

use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::worker::AssetWorker;

/// Download one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAssetTask {
    pub asset_id: Uuid,
    /// Timestamp when the task was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl IngestAssetTask {
    pub fn new(asset_id: Uuid) -> Self {
        Self {
            asset_id,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Task queue is closed")]
    Closed,

    #[error("Task queue backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AssetDispatcher: Send + Sync {
    async fn dispatch(&self, task: IngestAssetTask) -> Result<(), DispatchError>;
}

/// Durable queue on the apalis PostgreSQL storage
#[derive(Clone)]
pub struct PostgresDispatcher {
    storage: PostgresStorage<IngestAssetTask>,
}

impl PostgresDispatcher {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            storage: PostgresStorage::new(pool),
        }
    }

    pub fn storage(&self) -> PostgresStorage<IngestAssetTask> {
        self.storage.clone()
    }
}

#[async_trait]
impl AssetDispatcher for PostgresDispatcher {
    async fn dispatch(&self, task: IngestAssetTask) -> Result<(), DispatchError> {
        let asset_id = task.asset_id;
        let mut storage = self.storage.clone();
        storage
            .push(task)
            .await
            .map_err(|e| DispatchError::Backend(e.to_string()))?;
        debug!(asset_id = %asset_id, "Task pushed to queue");
        Ok(())
    }
}

/// In-process queue with a bounded worker pool
#[derive(Clone)]
pub struct LocalDispatcher {
    sender: mpsc::UnboundedSender<IngestAssetTask>,
}

impl LocalDispatcher {
    /// Start the consumer loop; at most `concurrency` tasks run at once
    pub fn spawn(worker: AssetWorker, concurrency: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<IngestAssetTask>();
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        let handle = tokio::spawn(async move {
            info!(concurrency, "Local asset worker started");
            while let Some(task) = receiver.recv().await {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let worker = worker.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = worker.process(task.asset_id).await {
                        error!(asset_id = %task.asset_id, "Asset task failed: {}", e);
                    }
                });
            }
            info!("Local asset worker stopped");
        });

        (Self { sender }, handle)
    }
}

#[async_trait]
impl AssetDispatcher for LocalDispatcher {
    async fn dispatch(&self, task: IngestAssetTask) -> Result<(), DispatchError> {
        self.sender.send(task).map_err(|_| DispatchError::Closed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{CatalogStore, MemoryStore};
    use crate::models::AssetStatus;
    use crate::testing::{seed_record, StubMaterializer};
    use std::time::Duration;

    #[test]
    fn test_task_payload_shape() {
        let task = IngestAssetTask::new(Uuid::nil());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["asset_id"], "00000000-0000-0000-0000-000000000000");
        let back: IngestAssetTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[tokio::test]
    async fn test_local_dispatcher_runs_tasks() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "7", 3).await;
        let (_, assets) = store.create_job(&links).await.unwrap();

        let worker = AssetWorker::new(store.clone(), Arc::new(StubMaterializer::succeeding()));
        let (dispatcher, _handle) = LocalDispatcher::spawn(worker, 2);

        for asset in &assets {
            dispatcher.dispatch(IngestAssetTask::new(asset.id)).await.unwrap();
        }

        let ids: Vec<Uuid> = assets.iter().map(|a| a.id).collect();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let statuses = store.asset_statuses(&ids).await.unwrap();
                if statuses.iter().all(|s| *s == AssetStatus::Done) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_closed() {
        let worker = AssetWorker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubMaterializer::succeeding()),
        );
        let (dispatcher, handle) = LocalDispatcher::spawn(worker, 1);
        handle.abort();
        let _ = handle.await;

        let result = dispatcher.dispatch(IngestAssetTask::new(Uuid::new_v4())).await;
        assert!(matches!(result, Err(DispatchError::Closed)));
    }
}
