//! PostgreSQL implementation of [`CatalogStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{CatalogStore, StoreError, StoreResult, UpsertOutcome};
use crate::catalog::ParsedRecord;
use crate::models::{Asset, AssetStatus, DownloadResult, Job, Link, Record};

const LINK_COLUMNS: &str = "id, record_idn, url, label, description, kind, created_at";

const ASSET_COLUMNS: &str = "id, link_id, status, storage_key, sha256, mime_type, size_bytes, \
                             error, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RecordRow {
    idn: String,
    title: Option<String>,
    year: Option<i32>,
    raw_marcxml: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Self {
            idn: row.idn,
            title: row.title,
            year: row.year,
            raw_marcxml: row.raw_marcxml,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    id: Uuid,
    record_idn: String,
    url: String,
    label: Option<String>,
    description: Option<String>,
    kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for Link {
    type Error = StoreError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            record_idn: row.record_idn,
            url: row.url,
            label: row.label,
            description: row.description,
            kind: row.kind.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AssetRow {
    id: Uuid,
    link_id: Uuid,
    status: String,
    storage_key: Option<String>,
    sha256: Option<String>,
    mime_type: Option<String>,
    size_bytes: Option<i64>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = StoreError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            link_id: row.link_id,
            status: row.status.parse()?,
            storage_key: row.storage_key,
            sha256: row.sha256,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn set_asset_status(
        &self,
        id: Uuid,
        status: AssetStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE assets SET status = $2, error = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Asset", id));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn reconcile(&self, batch: &[ParsedRecord]) -> StoreResult<Vec<UpsertOutcome>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(batch.len());

        for record in batch {
            // xmax is zero only for rows created by this statement
            let record_inserted: bool = sqlx::query_scalar(
                r#"
                INSERT INTO records (idn, title, year, raw_marcxml)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (idn) DO UPDATE SET
                    title = EXCLUDED.title,
                    year = EXCLUDED.year,
                    raw_marcxml = EXCLUDED.raw_marcxml,
                    updated_at = NOW()
                RETURNING (xmax = 0)
                "#,
            )
            .bind(&record.idn)
            .bind(&record.title)
            .bind(record.year)
            .bind(&record.raw_marcxml)
            .fetch_one(&mut *tx)
            .await?;

            let mut outcome = UpsertOutcome {
                idn: record.idn.clone(),
                record_inserted,
                links_inserted: 0,
                links_updated: 0,
            };

            for link in &record.links {
                let link_inserted: bool = sqlx::query_scalar(
                    r#"
                    INSERT INTO links (id, record_idn, url, label, description, kind)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (record_idn, url) DO UPDATE SET
                        label = EXCLUDED.label,
                        description = EXCLUDED.description,
                        kind = EXCLUDED.kind
                    RETURNING (xmax = 0)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&record.idn)
                .bind(&link.url)
                .bind(&link.label)
                .bind(&link.description)
                .bind(link.kind.as_str())
                .fetch_one(&mut *tx)
                .await?;

                if link_inserted {
                    outcome.links_inserted += 1;
                } else {
                    outcome.links_updated += 1;
                }
            }

            outcomes.push(outcome);
        }

        tx.commit().await?;
        debug!(records = outcomes.len(), "Committed reconcile batch");

        Ok(outcomes)
    }

    async fn get_record(&self, idn: &str) -> StoreResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT idn, title, year, raw_marcxml, created_at, updated_at \
             FROM records WHERE idn = $1",
        )
        .bind(idn)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Record::from))
    }

    async fn list_links(&self, idn: &str) -> StoreResult<Vec<Link>> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE record_idn = $1 ORDER BY created_at, id"
        ))
        .bind(idn)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn select_links(&self, idn: &str, link_ids: &[Uuid]) -> StoreResult<Vec<Link>> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links \
             WHERE record_idn = $1 AND id = ANY($2) ORDER BY created_at, id"
        ))
        .bind(idn)
        .bind(link_ids)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Link::try_from).transpose()
    }

    async fn create_job(&self, links: &[Link]) -> StoreResult<(Job, Vec<Asset>)> {
        let mut tx = self.pool.begin().await?;

        let job: Job = sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (id, status) VALUES ($1, 'running') \
             RETURNING id, status, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let mut assets = Vec::with_capacity(links.len());
        for link in links {
            let asset: Asset = sqlx::query_as::<_, AssetRow>(&format!(
                "INSERT INTO assets (id, link_id, status) VALUES ($1, $2, 'queued') \
                 RETURNING {ASSET_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(link.id)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

            sqlx::query("INSERT INTO job_items (job_id, asset_id) VALUES ($1, $2)")
                .bind(job.id)
                .bind(asset.id)
                .execute(&mut *tx)
                .await?;

            assets.push(asset);
        }

        tx.commit().await?;

        Ok((job, assets))
    }

    async fn get_asset(&self, id: Uuid) -> StoreResult<Option<Asset>> {
        let row = sqlx::query_as::<_, AssetRow>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Asset::try_from).transpose()
    }

    async fn mark_asset_downloading(&self, id: Uuid) -> StoreResult<()> {
        self.set_asset_status(id, AssetStatus::Downloading, None)
            .await
    }

    async fn mark_asset_done(&self, id: Uuid, result: &DownloadResult) -> StoreResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE assets SET
                status = 'done',
                storage_key = $2,
                sha256 = $3,
                mime_type = $4,
                size_bytes = $5,
                error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&result.storage_key)
        .bind(&result.sha256)
        .bind(&result.mime_type)
        .bind(result.size_bytes)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("Asset", id));
        }
        Ok(())
    }

    async fn mark_asset_failed(&self, id: Uuid, error: &str) -> StoreResult<()> {
        self.set_asset_status(id, AssetStatus::Failed, Some(error))
            .await
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, status, created_at, updated_at FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn job_asset_ids(&self, job_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT asset_id FROM job_items WHERE job_id = $1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn asset_statuses(&self, ids: &[Uuid]) -> StoreResult<Vec<AssetStatus>> {
        let statuses = sqlx::query_scalar::<_, String>(
            "SELECT status FROM assets WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        statuses
            .iter()
            .map(|s| s.parse().map_err(StoreError::from))
            .collect()
    }

    async fn complete_job(&self, job_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', updated_at = NOW() \
             WHERE id = $1 AND status <> 'completed'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn jobs_for_asset(&self, asset_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT job_id FROM job_items WHERE asset_id = $1",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
