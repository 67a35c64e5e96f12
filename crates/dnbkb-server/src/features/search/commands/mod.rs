//! Search commands

pub mod search_catalog;

pub use search_catalog::{SearchCatalogCommand, SearchCatalogError};
