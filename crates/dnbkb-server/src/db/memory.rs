//! In-memory implementation of [`CatalogStore`]
//!
//! One mutex guards all tables so every trait call is atomic, mirroring the
//! transactional guarantees of the PostgreSQL store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CatalogStore, StoreError, StoreResult, UpsertOutcome};
use crate::catalog::ParsedRecord;
use crate::models::{Asset, AssetStatus, DownloadResult, Job, JobItem, JobStatus, Link, Record};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<String, Record>,
    /// Insertion order doubles as creation order
    links: Vec<Link>,
    assets: HashMap<Uuid, Asset>,
    jobs: HashMap<Uuid, Job>,
    job_items: Vec<JobItem>,
    next_item_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_completions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `mark_asset_done` fail with a pool timeout
    pub fn fail_completions(&self, fail: bool) {
        self.fail_completions.store(fail, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    pub fn asset_count(&self) -> usize {
        self.lock().assets.len()
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn job_items(&self, job_id: Uuid) -> Vec<JobItem> {
        self.lock()
            .job_items
            .iter()
            .filter(|item| item.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Overwrite an asset's status directly
    pub fn force_asset_status(&self, id: Uuid, status: AssetStatus) {
        if let Some(asset) = self.lock().assets.get_mut(&id) {
            asset.status = status;
        }
    }

    fn update_asset<F>(&self, id: Uuid, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Asset),
    {
        let mut tables = self.lock();
        let asset = tables
            .assets
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Asset", id))?;
        apply(asset);
        asset.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn reconcile(&self, batch: &[ParsedRecord]) -> StoreResult<Vec<UpsertOutcome>> {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(batch.len());

        for parsed in batch {
            let record_inserted = match tables.records.get_mut(&parsed.idn) {
                Some(existing) => {
                    existing.title = parsed.title.clone();
                    existing.year = parsed.year;
                    existing.raw_marcxml = parsed.raw_marcxml.clone();
                    existing.updated_at = now;
                    false
                },
                None => {
                    tables.records.insert(
                        parsed.idn.clone(),
                        Record {
                            idn: parsed.idn.clone(),
                            title: parsed.title.clone(),
                            year: parsed.year,
                            raw_marcxml: parsed.raw_marcxml.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    true
                },
            };

            let mut outcome = UpsertOutcome {
                idn: parsed.idn.clone(),
                record_inserted,
                links_inserted: 0,
                links_updated: 0,
            };

            for link in &parsed.links {
                let existing = tables
                    .links
                    .iter_mut()
                    .find(|l| l.record_idn == parsed.idn && l.url == link.url);
                match existing {
                    Some(stored) => {
                        stored.label = link.label.clone();
                        stored.description = link.description.clone();
                        stored.kind = link.kind;
                        outcome.links_updated += 1;
                    },
                    None => {
                        tables.links.push(Link {
                            id: Uuid::new_v4(),
                            record_idn: parsed.idn.clone(),
                            url: link.url.clone(),
                            label: link.label.clone(),
                            description: link.description.clone(),
                            kind: link.kind,
                            created_at: Utc::now(),
                        });
                        outcome.links_inserted += 1;
                    },
                }
            }

            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn get_record(&self, idn: &str) -> StoreResult<Option<Record>> {
        Ok(self.lock().records.get(idn).cloned())
    }

    async fn list_links(&self, idn: &str) -> StoreResult<Vec<Link>> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| l.record_idn == idn)
            .cloned()
            .collect())
    }

    async fn select_links(&self, idn: &str, link_ids: &[Uuid]) -> StoreResult<Vec<Link>> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| l.record_idn == idn && link_ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<Link>> {
        Ok(self.lock().links.iter().find(|l| l.id == id).cloned())
    }

    async fn create_job(&self, links: &[Link]) -> StoreResult<(Job, Vec<Asset>)> {
        let mut guard = self.lock();
        let tables = &mut *guard;
        let job = Job::running();
        let mut assets = Vec::with_capacity(links.len());

        for link in links {
            let asset = Asset::queued(link.id);
            tables.next_item_id += 1;
            let item = JobItem {
                id: tables.next_item_id,
                job_id: job.id,
                asset_id: asset.id,
            };
            tables.job_items.push(item);
            tables.assets.insert(asset.id, asset.clone());
            assets.push(asset);
        }

        tables.jobs.insert(job.id, job.clone());
        Ok((job, assets))
    }

    async fn get_asset(&self, id: Uuid) -> StoreResult<Option<Asset>> {
        Ok(self.lock().assets.get(&id).cloned())
    }

    async fn mark_asset_downloading(&self, id: Uuid) -> StoreResult<()> {
        self.update_asset(id, |asset| {
            asset.status = AssetStatus::Downloading;
            asset.error = None;
        })
    }

    async fn mark_asset_done(&self, id: Uuid, result: &DownloadResult) -> StoreResult<()> {
        if self.fail_completions.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.update_asset(id, |asset| {
            asset.status = AssetStatus::Done;
            asset.storage_key = Some(result.storage_key.clone());
            asset.sha256 = Some(result.sha256.clone());
            asset.mime_type = result.mime_type.clone();
            asset.size_bytes = Some(result.size_bytes);
            asset.error = None;
        })
    }

    async fn mark_asset_failed(&self, id: Uuid, error: &str) -> StoreResult<()> {
        self.update_asset(id, |asset| {
            asset.status = AssetStatus::Failed;
            asset.error = Some(error.to_string());
        })
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn job_asset_ids(&self, job_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .lock()
            .job_items
            .iter()
            .filter(|item| item.job_id == job_id)
            .map(|item| item.asset_id)
            .collect())
    }

    async fn asset_statuses(&self, ids: &[Uuid]) -> StoreResult<Vec<AssetStatus>> {
        let tables = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.assets.get(id).map(|a| a.status))
            .collect())
    }

    async fn complete_job(&self, job_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables.jobs.get_mut(&job_id) {
            Some(job) if job.status != JobStatus::Completed => {
                job.status = JobStatus::Completed;
                job.updated_at = Utc::now();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn jobs_for_asset(&self, asset_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.lock();
        let mut jobs: Vec<Uuid> = Vec::new();
        for item in tables.job_items.iter().filter(|i| i.asset_id == asset_id) {
            if !jobs.contains(&item.job_id) {
                jobs.push(item.job_id);
            }
        }
        Ok(jobs)
    }
}
