//! Presign an asset download
//!
//! Only assets in `done` with a storage key get a link. Anything else is a
//! conflict rather than a missing resource, so clients can keep polling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::db::{CatalogStore, StoreError};
use crate::error::AppError;
use crate::models::AssetStatus;
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignAssetQuery {
    pub asset_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedAsset {
    pub url: String,
    pub expires_minutes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PresignAssetError {
    #[error("Asset '{0}' not found")]
    NotFound(Uuid),
    #[error("Asset '{id}' is not available for download (status: {status})")]
    NotReady { id: Uuid, status: AssetStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<PresignAssetError> for AppError {
    fn from(err: PresignAssetError) -> Self {
        match err {
            PresignAssetError::NotFound(_) => AppError::NotFound(err.to_string()),
            PresignAssetError::NotReady { .. } => AppError::Conflict(err.to_string()),
            PresignAssetError::Store(e) => e.into(),
            PresignAssetError::Storage(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(store, objects))]
pub async fn handle(
    store: &dyn CatalogStore,
    objects: &dyn ObjectStore,
    expires_in: Duration,
    query: PresignAssetQuery,
) -> Result<PresignedAsset, PresignAssetError> {
    let asset = store
        .get_asset(query.asset_id)
        .await?
        .ok_or(PresignAssetError::NotFound(query.asset_id))?;

    let key = asset.available_key().ok_or(PresignAssetError::NotReady {
        id: asset.id,
        status: asset.status,
    })?;

    let url = objects.presigned_get(key, expires_in).await?;

    Ok(PresignedAsset {
        url,
        expires_minutes: expires_in.as_secs() / 60,
    })
}
