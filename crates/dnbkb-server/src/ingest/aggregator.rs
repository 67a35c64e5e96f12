//! Job completion tracking
//!
//! A job is complete once every asset it references is terminal. Status is
//! recomputed from the assets rather than counted, so refreshing is safe to
//! repeat from any number of workers and readers.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{CatalogStore, StoreError};
use crate::models::JobStatus;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Job '{0}' not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A job with the assets it tracks, in item order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub asset_ids: Vec<Uuid>,
}

#[derive(Clone)]
pub struct JobAggregator {
    store: Arc<dyn CatalogStore>,
}

impl JobAggregator {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Recompute a job's status, flipping it to `completed` when every asset is terminal
    pub async fn refresh(&self, job_id: Uuid) -> Result<JobStatus, AggregateError> {
        Ok(self.evaluate(job_id).await?.status)
    }

    /// Refresh and return the job together with its asset ids
    pub async fn snapshot(&self, job_id: Uuid) -> Result<JobSnapshot, AggregateError> {
        self.evaluate(job_id).await
    }

    async fn evaluate(&self, job_id: Uuid) -> Result<JobSnapshot, AggregateError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(AggregateError::NotFound(job_id))?;

        let asset_ids = self.store.job_asset_ids(job_id).await?;

        if job.status == JobStatus::Completed {
            return Ok(JobSnapshot {
                id: job_id,
                status: JobStatus::Completed,
                asset_ids,
            });
        }

        let statuses = self.store.asset_statuses(&asset_ids).await?;
        let all_terminal = statuses.iter().all(|status| status.is_terminal());

        if !all_terminal {
            debug!(
                job_id = %job_id,
                pending = statuses.iter().filter(|s| !s.is_terminal()).count(),
                "Job still running"
            );
            return Ok(JobSnapshot {
                id: job_id,
                status: JobStatus::Running,
                asset_ids,
            });
        }

        if self.store.complete_job(job_id).await? {
            info!(job_id = %job_id, assets = asset_ids.len(), "Job completed");
        }

        Ok(JobSnapshot {
            id: job_id,
            status: JobStatus::Completed,
            asset_ids,
        })
    }
}
