//! Asset routes

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::queries::{presign_asset::handle as handle_presign, PresignAssetQuery, PresignedAsset};
use crate::error::AppError;
use crate::features::AppState;

/// Create asset routes
pub fn assets_routes() -> Router<AppState> {
    Router::new().route("/:asset_id/presign", get(presign_asset))
}

/// Presigned download link for a finished asset
///
/// GET /assets/:asset_id/presign
async fn presign_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<PresignedAsset>, AppError> {
    let presigned = handle_presign(
        state.store.as_ref(),
        state.objects.as_ref(),
        state.presign_expiry,
        PresignAssetQuery { asset_id },
    )
    .await?;
    Ok(Json(presigned))
}
