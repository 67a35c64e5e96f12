//! Search catalog command
//!
//! Validates the paging window, queries SRU and upserts every parseable record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{SearchError, SearchResponse};
use crate::error::AppError;
use crate::features::shared::validation::{
    validate_cql, validate_paging, PagingValidationError, QueryValidationError,
    DEFAULT_MAXIMUM_RECORDS, DEFAULT_START_RECORD,
};
use crate::features::AppState;

/// Command to search the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCatalogCommand {
    /// CQL query passed through to SRU
    pub cql: String,
    /// 1-based position of the first record
    #[serde(default = "default_start_record")]
    pub start_record: i64,
    #[serde(default = "default_maximum_records")]
    pub maximum_records: i64,
}

fn default_start_record() -> i64 {
    DEFAULT_START_RECORD
}

fn default_maximum_records() -> i64 {
    DEFAULT_MAXIMUM_RECORDS
}

#[derive(Debug, Error)]
pub enum SearchCatalogError {
    #[error(transparent)]
    Query(#[from] QueryValidationError),

    #[error(transparent)]
    Paging(#[from] PagingValidationError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl From<SearchCatalogError> for AppError {
    fn from(err: SearchCatalogError) -> Self {
        match err {
            SearchCatalogError::Query(e) => AppError::Validation(e.to_string()),
            SearchCatalogError::Paging(e) => AppError::Validation(e.to_string()),
            SearchCatalogError::Search(e) => e.into(),
        }
    }
}

pub async fn handle(
    state: &AppState,
    command: SearchCatalogCommand,
) -> Result<SearchResponse, SearchCatalogError> {
    validate_cql(&command.cql)?;
    let paging = validate_paging(
        command.start_record,
        command.maximum_records,
        state.max_page_size,
    )?;

    let response = state
        .reconciler
        .search(
            &state.sru,
            command.cql.trim(),
            paging.start_record,
            paging.maximum_records,
        )
        .await?;

    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let command: SearchCatalogCommand =
            serde_json::from_str(r#"{"cql": "tit=Faust"}"#).unwrap();
        assert_eq!(command.start_record, 1);
        assert_eq!(command.maximum_records, 10);
    }
}
