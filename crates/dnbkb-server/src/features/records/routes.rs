//! Record routes

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::commands::{
    ingest_record::handle as handle_ingest, IngestRecordCommand, IngestRecordResponse,
};
use super::queries::{get_record::handle as handle_get_record, GetRecordQuery, RecordDetails};
use crate::error::AppError;
use crate::features::AppState;

/// Create record routes
pub fn records_routes() -> Router<AppState> {
    Router::new()
        .route("/:idn", get(get_record))
        .route("/:idn/ingest", post(ingest_record))
}

/// Get a record with its links
///
/// GET /records/:idn
async fn get_record(
    State(state): State<AppState>,
    Path(idn): Path<String>,
) -> Result<Json<RecordDetails>, AppError> {
    let details = handle_get_record(state.store.as_ref(), GetRecordQuery { idn }).await?;
    Ok(Json(details))
}

/// Start materializing a record's links
///
/// POST /records/:idn/ingest
async fn ingest_record(
    State(state): State<AppState>,
    Path(idn): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestRecordResponse>), AppError> {
    let command = parse_ingest_body(&body)?;
    let response = handle_ingest(&state.orchestrator, &idn, command).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// An empty body selects every link; anything else must be a valid command
fn parse_ingest_body(body: &[u8]) -> Result<IngestRecordCommand, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(IngestRecordCommand::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid ingest request body: {}", e)))
}
