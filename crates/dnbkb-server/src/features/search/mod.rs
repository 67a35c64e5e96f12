//! Search feature module
//!
//! Runs a CQL query against the remote catalog and reconciles the returned
//! page into the local store before answering.

pub mod commands;
pub mod routes;

pub use routes::search_routes;
