//! Job routes

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::queries::{get_job::handle as handle_get_job, GetJobQuery, JobSnapshot};
use crate::error::AppError;
use crate::features::AppState;

/// Create job routes
pub fn jobs_routes() -> Router<AppState> {
    Router::new().route("/:job_id", get(get_job))
}

/// Get a job with its asset ids
///
/// GET /jobs/:job_id
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, AppError> {
    let snapshot = handle_get_job(&state.aggregator, GetJobQuery { job_id }).await?;
    Ok(Json(snapshot))
}
