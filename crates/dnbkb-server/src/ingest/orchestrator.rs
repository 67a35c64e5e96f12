//! Ingestion orchestrator
//!
//! Turns a record's links into a job with one queued asset per link, then
//! dispatches one task per asset. The ledger is committed before anything is
//! dispatched, and a failed dispatch never rolls it back.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::queue::{AssetDispatcher, IngestAssetTask};
use crate::db::{CatalogStore, StoreError};
use crate::models::{Asset, Job};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("No links selected for record '{0}'")]
    NoLinksSelected(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CreatedJob {
    pub job: Job,
    /// Assets in link order
    pub assets: Vec<Asset>,
    /// Assets whose task could not be queued; they stay `queued`
    pub dispatch_failures: Vec<Uuid>,
}

#[derive(Clone)]
pub struct IngestOrchestrator {
    store: Arc<dyn CatalogStore>,
    dispatcher: Arc<dyn AssetDispatcher>,
}

impl IngestOrchestrator {
    pub fn new(store: Arc<dyn CatalogStore>, dispatcher: Arc<dyn AssetDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Create a job for a record's links
    ///
    /// `None` or an empty list selects every link of the record; otherwise
    /// ids that do not belong to the record are ignored.
    #[instrument(skip(self, link_ids))]
    pub async fn create_job(
        &self,
        idn: &str,
        link_ids: Option<&[Uuid]>,
    ) -> Result<CreatedJob, IngestError> {
        if self.store.get_record(idn).await?.is_none() {
            return Err(IngestError::NotFound(idn.to_string()));
        }

        let links = match link_ids {
            Some(ids) if !ids.is_empty() => self.store.select_links(idn, ids).await?,
            _ => self.store.list_links(idn).await?,
        };

        if links.is_empty() {
            return Err(IngestError::NoLinksSelected(idn.to_string()));
        }

        let (job, assets) = self.store.create_job(&links).await?;
        info!(job_id = %job.id, assets = assets.len(), "Ingest job created");

        let mut dispatch_failures = Vec::new();
        for asset in &assets {
            if let Err(e) = self.dispatcher.dispatch(IngestAssetTask::new(asset.id)).await {
                error!(job_id = %job.id, asset_id = %asset.id, "Failed to dispatch asset task: {}", e);
                dispatch_failures.push(asset.id);
            }
        }

        Ok(CreatedJob {
            job,
            assets,
            dispatch_failures,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{AssetStatus, JobStatus};
    use crate::testing::{seed_record, RecordingDispatcher};

    fn orchestrator(
        store: Arc<MemoryStore>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> IngestOrchestrator {
        IngestOrchestrator::new(store, dispatcher)
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let store = Arc::new(MemoryStore::new());
        let result = orchestrator(store, Arc::new(RecordingDispatcher::default()))
            .create_job("nope", None)
            .await;
        assert!(matches!(result, Err(IngestError::NotFound(idn)) if idn == "nope"));
    }

    #[tokio::test]
    async fn test_all_links_when_none_selected() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "9", 3).await;
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let created = orchestrator(store.clone(), dispatcher.clone())
            .create_job("9", None)
            .await
            .unwrap();

        assert_eq!(created.job.status, JobStatus::Running);
        assert_eq!(created.assets.len(), 3);
        assert!(created.dispatch_failures.is_empty());
        let link_order: Vec<Uuid> = created.assets.iter().map(|a| a.link_id).collect();
        assert_eq!(link_order, links.iter().map(|l| l.id).collect::<Vec<_>>());
        assert!(created.assets.iter().all(|a| a.status == AssetStatus::Queued));

        let dispatched: Vec<Uuid> = dispatcher.tasks().iter().map(|t| t.asset_id).collect();
        assert_eq!(dispatched, created.assets.iter().map(|a| a.id).collect::<Vec<_>>());
        assert_eq!(store.job_items(created.job.id).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_selection_means_all_links() {
        let store = Arc::new(MemoryStore::new());
        seed_record(&store, "9", 2).await;

        let created = orchestrator(store, Arc::new(RecordingDispatcher::default()))
            .create_job("9", Some(Vec::new().as_slice()))
            .await
            .unwrap();
        assert_eq!(created.assets.len(), 2);
    }

    #[tokio::test]
    async fn test_foreign_link_ids_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let own = seed_record(&store, "9", 2).await;
        let foreign = seed_record(&store, "10", 1).await;

        let selection = vec![own[1].id, foreign[0].id];
        let created = orchestrator(store.clone(), Arc::new(RecordingDispatcher::default()))
            .create_job("9", Some(selection.as_slice()))
            .await
            .unwrap();
        assert_eq!(created.assets.len(), 1);
        assert_eq!(created.assets[0].link_id, own[1].id);

        let result = orchestrator(store, Arc::new(RecordingDispatcher::default()))
            .create_job("9", Some(&selection[1..]))
            .await;
        assert!(matches!(result, Err(IngestError::NoLinksSelected(_))));
    }

    #[tokio::test]
    async fn test_record_without_links_conflicts() {
        let store = Arc::new(MemoryStore::new());
        seed_record(&store, "9", 0).await;

        let result = orchestrator(store.clone(), Arc::new(RecordingDispatcher::default()))
            .create_job("9", None)
            .await;
        assert!(matches!(result, Err(IngestError::NoLinksSelected(_))));
        assert_eq!(store.asset_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_ledger() {
        let store = Arc::new(MemoryStore::new());
        seed_record(&store, "9", 2).await;
        let dispatcher = Arc::new(RecordingDispatcher::failing());

        let created = orchestrator(store.clone(), dispatcher)
            .create_job("9", None)
            .await
            .unwrap();

        assert_eq!(created.dispatch_failures.len(), 2);
        assert_eq!(store.asset_count(), 2);
        assert!(store.get_job(created.job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ingesting_twice_creates_fresh_assets() {
        let store = Arc::new(MemoryStore::new());
        let links = seed_record(&store, "9", 2).await;
        let orchestrator = orchestrator(store.clone(), Arc::new(RecordingDispatcher::default()));

        let first = orchestrator.create_job("9", None).await.unwrap();
        let second = orchestrator.create_job("9", None).await.unwrap();

        assert_ne!(first.job.id, second.job.id);
        assert_eq!(store.job_count(), 2);
        assert_eq!(store.asset_count(), 2 * links.len());
        for (a, b) in first.assets.iter().zip(&second.assets) {
            assert_ne!(a.id, b.id);
            assert_eq!(a.link_id, b.link_id);
        }
        assert_eq!(store.job_items(first.job.id).len(), links.len());
        assert_eq!(store.job_items(second.job.id).len(), links.len());
    }
}
