//! Shared validation utilities
//!
//! Request checks that run before any handler touches the catalog or the store.

use thiserror::Error;

pub const DEFAULT_START_RECORD: i64 = 1;
pub const DEFAULT_MAXIMUM_RECORDS: i64 = 10;

/// Errors that can occur during paging validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PagingValidationError {
    #[error("start_record must be at least 1")]
    StartRecord,

    #[error("maximum_records must be between 1 and {max}")]
    MaximumRecords { max: u32 },
}

/// Errors that can occur during query validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("cql is required and cannot be empty")]
    Required,
}

/// Validated SRU paging window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub start_record: u32,
    pub maximum_records: u32,
}

/// Validate a paging window
///
/// # Rules
/// - `start_record` is 1-based and at least 1
/// - `maximum_records` is between 1 and `max_page_size`
pub fn validate_paging(
    start_record: i64,
    maximum_records: i64,
    max_page_size: u32,
) -> Result<Paging, PagingValidationError> {
    let start_record = u32::try_from(start_record)
        .ok()
        .filter(|start| *start >= 1)
        .ok_or(PagingValidationError::StartRecord)?;

    let maximum_records = u32::try_from(maximum_records)
        .ok()
        .filter(|max| (1..=max_page_size).contains(max))
        .ok_or(PagingValidationError::MaximumRecords { max: max_page_size })?;

    Ok(Paging {
        start_record,
        maximum_records,
    })
}

/// Validate a CQL query string
pub fn validate_cql(cql: &str) -> Result<(), QueryValidationError> {
    if cql.trim().is_empty() {
        return Err(QueryValidationError::Required);
    }
    Ok(())
}
