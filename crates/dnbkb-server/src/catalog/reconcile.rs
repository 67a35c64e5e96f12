//! Search-and-reconcile pipeline
//!
//! Parses raw MARCXML records and upserts the parseable ones in a single store
//! transaction. Unparseable records are logged and left out of the hits.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::marc::{parse_marcxml_record, ParsedRecord};
use super::sru::{SruClient, SruError};
use crate::db::{CatalogStore, StoreError};

/// Summary of one reconciled record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub idn: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub creators: Vec<String>,
    /// Links inserted plus links updated
    pub links_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    pub number_of_records: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Protocol(#[from] SruError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Parse every record, dropping the ones that fail
    pub fn parse_batch(raw_records: &[String]) -> Vec<ParsedRecord> {
        raw_records
            .iter()
            .enumerate()
            .filter_map(|(position, raw)| match parse_marcxml_record(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(position, error = %e, "Skipping unparseable record");
                    None
                },
            })
            .collect()
    }

    #[instrument(skip_all, fields(batch = raw_records.len()))]
    pub async fn reconcile(&self, raw_records: &[String]) -> Result<Vec<SearchHit>, StoreError> {
        let parsed = Self::parse_batch(raw_records);
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = self.store.reconcile(&parsed).await?;

        let inserted = outcomes.iter().filter(|o| o.record_inserted).count();
        info!(
            records = parsed.len(),
            inserted,
            updated = parsed.len() - inserted,
            skipped = raw_records.len() - parsed.len(),
            "Reconciled search batch"
        );

        Ok(parsed
            .into_iter()
            .zip(outcomes)
            .map(|(record, outcome)| SearchHit {
                links_count: outcome.links_processed(),
                idn: record.idn,
                title: record.title,
                year: record.year,
                creators: record.creators,
            })
            .collect())
    }

    /// Query the catalog and reconcile the returned page
    #[instrument(skip(self, client))]
    pub async fn search(
        &self,
        client: &SruClient,
        query: &str,
        start_record: u32,
        maximum_records: u32,
    ) -> Result<SearchResponse, SearchError> {
        let result = client.search(query, start_record, maximum_records).await?;
        let hits = self.reconcile(&result.records).await?;

        Ok(SearchResponse {
            number_of_records: result.number_of_records,
            hits,
        })
    }
}
