use serde::{Deserialize, Serialize};

use crate::db::{CatalogStore, StoreError};
use crate::error::AppError;
use crate::features::records::types::LinkSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRecordQuery {
    pub idn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDetails {
    pub idn: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    /// Creators are only known at search time and are not persisted
    pub creators: Vec<String>,
    pub links: Vec<LinkSummary>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetRecordError {
    #[error("Record '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GetRecordError> for AppError {
    fn from(err: GetRecordError) -> Self {
        match err {
            GetRecordError::NotFound(_) => AppError::NotFound(err.to_string()),
            GetRecordError::Store(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn CatalogStore,
    query: GetRecordQuery,
) -> Result<RecordDetails, GetRecordError> {
    let record = store
        .get_record(&query.idn)
        .await?
        .ok_or_else(|| GetRecordError::NotFound(query.idn.clone()))?;

    let links = store
        .list_links(&record.idn)
        .await?
        .into_iter()
        .map(LinkSummary::from)
        .collect();

    Ok(RecordDetails {
        idn: record.idn,
        title: record.title,
        year: record.year,
        creators: Vec::new(),
        links,
    })
}
