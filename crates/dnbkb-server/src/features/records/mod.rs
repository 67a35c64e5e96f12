//! Records feature module
//!
//! Reads a reconciled record with its links and starts ingest jobs for it.

pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use routes::records_routes;
