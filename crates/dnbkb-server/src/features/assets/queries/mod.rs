pub mod presign_asset;

pub use presign_asset::{PresignAssetError, PresignAssetQuery, PresignedAsset};
