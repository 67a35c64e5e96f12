use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Asset, AssetStatus, Link, LinkKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSummary {
    pub id: Uuid,
    pub url: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub kind: LinkKind,
}

impl From<Link> for LinkSummary {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            url: link.url,
            label: link.label,
            description: link.description,
            kind: link.kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: Uuid,
    pub link_id: Uuid,
    pub status: AssetStatus,
}

impl From<&Asset> for AssetSummary {
    fn from(asset: &Asset) -> Self {
        Self {
            id: asset.id,
            link_id: asset.link_id,
            status: asset.status,
        }
    }
}
