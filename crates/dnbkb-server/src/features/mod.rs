//! Feature modules implementing the knowledge base API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **search**: Query the remote catalog and reconcile the results locally
//! - **records**: Read a stored record with its links, start an ingest job for it
//! - **jobs**: Job status with lazy completion refresh
//! - **assets**: Time-limited download links for materialized assets
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions

pub mod assets;
pub mod jobs;
pub mod records;
pub mod search;
pub mod shared;

use axum::{extract::State, http::StatusCode, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Reconciler, SruClient};
use crate::config::MAX_SEARCH_PAGE_SIZE;
use crate::db::CatalogStore;
use crate::ingest::config::DEFAULT_PRESIGN_EXPIRY_MINUTES;
use crate::ingest::{AssetDispatcher, IngestOrchestrator, JobAggregator};
use crate::storage::ObjectStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub sru: Arc<SruClient>,
    pub reconciler: Reconciler,
    pub orchestrator: IngestOrchestrator,
    pub aggregator: JobAggregator,
    /// Lifetime of presigned asset URLs
    pub presign_expiry: Duration,
    /// Upper bound for `maximum_records` on search
    pub max_page_size: u32,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        objects: Arc<dyn ObjectStore>,
        sru: SruClient,
        dispatcher: Arc<dyn AssetDispatcher>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            orchestrator: IngestOrchestrator::new(store.clone(), dispatcher),
            aggregator: JobAggregator::new(store.clone()),
            store,
            objects,
            sru: Arc::new(sru),
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_MINUTES * 60),
            max_page_size: MAX_SEARCH_PAGE_SIZE,
        }
    }

    pub fn with_presign_expiry(mut self, expiry: Duration) -> Self {
        self.presign_expiry = expiry;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }
}

/// Creates the API router with all feature routes mounted
///
/// - `/search` - Catalog search and reconciliation
/// - `/records` - Record details and ingestion
/// - `/jobs` - Job status
/// - `/assets` - Presigned asset links
pub fn router(state: AppState) -> Router<()> {
    Router::new()
        .nest("/search", search::search_routes())
        .nest("/records", records::records_routes())
        .nest("/jobs", jobs::jobs_routes())
        .nest("/assets", assets::assets_routes())
        .with_state(state)
}

/// Health check handler
///
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.store.ping().await {
        Ok(()) => Ok(Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}
