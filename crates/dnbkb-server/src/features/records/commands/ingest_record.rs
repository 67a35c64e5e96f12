//! Start an ingest job for a record
//!
//! Creates one queued asset per selected link and hands each to the dispatcher.
//! Dispatch failures are logged and leave the asset queued; the job is still
//! returned to the caller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::records::types::AssetSummary;
use crate::ingest::{IngestError, IngestOrchestrator};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRecordCommand {
    /// Links to materialize; absent or empty selects all links of the record
    #[serde(default)]
    pub link_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRecordResponse {
    pub job_id: Uuid,
    pub assets: Vec<AssetSummary>,
}

#[tracing::instrument(skip(orchestrator, command))]
pub async fn handle(
    orchestrator: &IngestOrchestrator,
    idn: &str,
    command: IngestRecordCommand,
) -> Result<IngestRecordResponse, IngestError> {
    let created = orchestrator
        .create_job(idn, command.link_ids.as_deref())
        .await?;

    Ok(IngestRecordResponse {
        job_id: created.job.id,
        assets: created.assets.iter().map(AssetSummary::from).collect(),
    })
}
