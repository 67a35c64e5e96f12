pub mod ingest_record;

pub use ingest_record::{IngestRecordCommand, IngestRecordResponse};
