//! Asset ingestion
//!
//! Materializes catalog links into object storage through a job/worker model.
//!
//! # Architecture
//!
//! - **config**: Download limits, retry policy and worker settings (INGEST_* environment variables)
//! - **url_safety**: Scheme and address policy applied before every fetch
//! - **downloader**: Streaming download with hashing, size limit, upload and retry
//! - **orchestrator**: Creates jobs and queued assets, dispatches one task per asset
//! - **worker**: Per-asset state machine run by either queue backend
//! - **aggregator**: Derives job completion from asset states
//! - **queue**: Task payload and the PostgreSQL / in-process dispatchers
//! - **scheduler**: Apalis worker setup for the PostgreSQL queue
//!
//! # Public API
//!
//! Exposed through `features::records` (`POST /api/v1/records/:idn/ingest`),
//! `features::jobs` and `features::assets`.

pub mod aggregator;
pub mod config;
pub mod downloader;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod url_safety;
pub mod worker;

pub use aggregator::{AggregateError, JobAggregator, JobSnapshot};
pub use config::{IngestConfig, QueueBackend, RetryPolicy};
pub use downloader::{DownloadError, Downloader, Materializer};
pub use orchestrator::{CreatedJob, IngestError, IngestOrchestrator};
pub use queue::{AssetDispatcher, DispatchError, IngestAssetTask, LocalDispatcher, PostgresDispatcher};
pub use scheduler::JobScheduler;
pub use url_safety::{GatedResolver, HostResolver, SystemResolver, UnsafeUrlError, UrlSafetyGate};
pub use worker::{AssetOutcome, AssetWorker};
