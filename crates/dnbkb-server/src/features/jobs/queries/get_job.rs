use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::{AggregateError, JobAggregator};

pub use crate::ingest::JobSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

#[tracing::instrument(skip(aggregator))]
pub async fn handle(
    aggregator: &JobAggregator,
    query: GetJobQuery,
) -> Result<JobSnapshot, AggregateError> {
    aggregator.snapshot(query.job_id).await
}
