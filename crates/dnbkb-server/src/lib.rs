//! DNB Knowledge Base Server Library
//!
//! HTTP service that searches the Deutsche Nationalbibliothek catalog over SRU,
//! keeps a local copy of the returned records and their links, and materializes
//! linked documents into S3-compatible object storage.
//!
//! # Overview
//!
//! - **Catalog**: SRU client, MARC21-xml parsing and reconciliation into PostgreSQL
//! - **Ingest**: Jobs of per-link assets, downloaded by a bounded worker pool
//!   behind an SSRF gate with retries and size limits
//! - **Storage**: Object uploads and presigned download links
//! - **Features**: Axum routes for search, records, jobs and assets
//!
//! # Architecture
//!
//! Route handlers are split into commands (writes) and queries (reads) per feature.
//! Persistence sits behind the [`db::CatalogStore`] trait and object storage behind
//! [`storage::ObjectStore`], so every feature runs against in-memory backends in tests.
//!
//! Asset tasks are dispatched after the job is committed. With the `postgres` queue
//! backend they go through apalis; with `local` they run on an in-process pool.
//!
//! # Example
//!
//! ```no_run
//! use dnbkb_server::{catalog::SruClient, config::Config, db, features, ingest, storage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let store = Arc::new(db::PgCatalogStore::new(pool.clone()));
//!     let objects = Arc::new(storage::S3Storage::new(config.storage.clone()));
//!     let dispatcher = Arc::new(ingest::PostgresDispatcher::new(&pool));
//!     let sru = SruClient::new(&config.catalog)?;
//!
//!     let app = features::router(features::AppState::new(store, objects, sru, dispatcher));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod storage;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::AppError;
