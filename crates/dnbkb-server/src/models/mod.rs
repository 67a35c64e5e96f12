//! Domain entities
//!
//! Plain data mirrored from the relational schema. Relationships are foreign-key
//! ids; navigation goes through [`crate::db::CatalogStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A status or kind string that does not match any known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A bibliographic record keyed by its catalog identifier (IDN)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub idn: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    /// Verbatim MARCXML as received from the catalog
    pub raw_marcxml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Classification of a link found in a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Table of contents
    Toc,
    External,
    /// Resolves inside the catalog's own persistent-identifier domain
    Dnb,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Toc => "toc",
            LinkKind::External => "external",
            LinkKind::Dnb => "dnb",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toc" => Ok(LinkKind::Toc),
            "external" => Ok(LinkKind::External),
            "dnb" => Ok(LinkKind::Dnb),
            other => Err(UnknownVariant {
                kind: "link kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub record_idn: String,
    pub url: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub kind: LinkKind,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of an asset: queued -> downloading -> done | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Queued,
    Downloading,
    Done,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Queued => "queued",
            AssetStatus::Downloading => "downloading",
            AssetStatus::Done => "done",
            AssetStatus::Failed => "failed",
        }
    }

    /// Done and failed assets never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Done | AssetStatus::Failed)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(AssetStatus::Queued),
            "downloading" => Ok(AssetStatus::Downloading),
            "done" => Ok(AssetStatus::Done),
            "failed" => Ok(AssetStatus::Failed),
            other => Err(UnknownVariant {
                kind: "asset status",
                value: other.to_string(),
            }),
        }
    }
}

/// One materialization attempt of a link's URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub link_id: Uuid,
    pub status: AssetStatus,
    pub storage_key: Option<String>,
    pub sha256: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// A freshly queued asset for `link_id`
    pub fn queued(link_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            link_id,
            status: AssetStatus::Queued,
            storage_key: None,
            sha256: None,
            mime_type: None,
            size_bytes: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The storage key, only when the asset is done and has one
    pub fn available_key(&self) -> Option<&str> {
        match self.status {
            AssetStatus::Done => self.storage_key.as_deref().filter(|k| !k.is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            other => Err(UnknownVariant {
                kind: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// One ingestion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn running() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Binds a job to one asset it is responsible for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobItem {
    pub id: i64,
    pub job_id: Uuid,
    pub asset_id: Uuid,
}

/// Metadata of an object committed to storage by the download worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub storage_key: String,
    pub sha256: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}

/// Object key for an asset: `{record_idn}/{asset_id}`
pub fn asset_storage_key(record_idn: &str, asset_id: Uuid) -> String {
    format!("{}/{}", record_idn, asset_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [
            AssetStatus::Queued,
            AssetStatus::Downloading,
            AssetStatus::Done,
            AssetStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AssetStatus>().unwrap(), status);
        }
        assert!("archived".parse::<AssetStatus>().is_err());
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert_eq!("dnb".parse::<LinkKind>().unwrap(), LinkKind::Dnb);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AssetStatus::Done.is_terminal());
        assert!(AssetStatus::Failed.is_terminal());
        assert!(!AssetStatus::Queued.is_terminal());
        assert!(!AssetStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_available_key_requires_done() {
        let mut asset = Asset::queued(Uuid::new_v4());
        asset.storage_key = Some("123/abc".to_string());
        assert_eq!(asset.available_key(), None);

        asset.status = AssetStatus::Done;
        assert_eq!(asset.available_key(), Some("123/abc"));

        asset.storage_key = Some(String::new());
        assert_eq!(asset.available_key(), None);
    }

    #[test]
    fn test_asset_storage_key() {
        let id = Uuid::nil();
        assert_eq!(
            asset_storage_key("1234567890", id),
            "1234567890/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&LinkKind::Toc).unwrap(), "\"toc\"");
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"running\"");
    }
}
