//! Persistence
//!
//! [`CatalogStore`] is the repository for records, links, assets and jobs. It
//! returns plain entities; relationships are followed by id through explicit
//! calls. [`PgCatalogStore`] is the production implementation and
//! [`MemoryStore`] backs tests and local runs.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::ParsedRecord;
use crate::config::DatabaseConfig;
use crate::models::{
    Asset, AssetStatus, DownloadResult, Job, Link, Record, UnknownVariant,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgCatalogStore;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored status or kind column holds a value this build does not know
    #[error("Corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),

    /// Requested row does not exist
    #[error("{0}")]
    NotFound(String),
}

impl StoreError {
    /// Create a not found error with resource context
    pub fn not_found(resource_type: &str, identifier: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} '{}' not found", resource_type, identifier))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of upserting one parsed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub idn: String,
    pub record_inserted: bool,
    pub links_inserted: usize,
    pub links_updated: usize,
}

impl UpsertOutcome {
    pub fn links_processed(&self) -> usize {
        self.links_inserted + self.links_updated
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Cheap connectivity probe
    async fn ping(&self) -> StoreResult<()>;

    /// Upsert records by idn and their links by (idn, url), atomically for the
    /// whole batch. Returns one outcome per input record, in order.
    async fn reconcile(&self, batch: &[ParsedRecord]) -> StoreResult<Vec<UpsertOutcome>>;

    async fn get_record(&self, idn: &str) -> StoreResult<Option<Record>>;

    /// Links of a record, oldest first
    async fn list_links(&self, idn: &str) -> StoreResult<Vec<Link>>;

    /// Links of a record restricted to `link_ids`; ids of other records are ignored
    async fn select_links(&self, idn: &str, link_ids: &[Uuid]) -> StoreResult<Vec<Link>>;

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<Link>>;

    /// Create a running job with one queued asset and one job item per link,
    /// atomically. Assets are returned in link order.
    async fn create_job(&self, links: &[Link]) -> StoreResult<(Job, Vec<Asset>)>;

    async fn get_asset(&self, id: Uuid) -> StoreResult<Option<Asset>>;

    /// Set `downloading` and clear any previous error
    async fn mark_asset_downloading(&self, id: Uuid) -> StoreResult<()>;

    async fn mark_asset_done(&self, id: Uuid, result: &DownloadResult) -> StoreResult<()>;

    async fn mark_asset_failed(&self, id: Uuid, error: &str) -> StoreResult<()>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Asset ids of a job in item order
    async fn job_asset_ids(&self, job_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Current status of each existing asset in `ids`
    async fn asset_statuses(&self, ids: &[Uuid]) -> StoreResult<Vec<AssetStatus>>;

    /// Flip a job to `completed`. Returns `true` only for the call that flipped it.
    async fn complete_job(&self, job_id: Uuid) -> StoreResult<bool>;

    /// Jobs that reference an asset
    async fn jobs_for_asset(&self, asset_id: Uuid) -> StoreResult<Vec<Uuid>>;
}

pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the SQL migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
