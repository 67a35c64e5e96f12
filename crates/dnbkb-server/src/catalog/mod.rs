//! Remote catalog access: SRU search, MARCXML parsing and reconciliation

pub mod marc;
pub mod reconcile;
pub mod sru;

pub use marc::{parse_marcxml_record, ParseError, ParsedLink, ParsedRecord};
pub use reconcile::{Reconciler, SearchError, SearchHit, SearchResponse};
pub use sru::{SruClient, SruError, SruSearchResult};
