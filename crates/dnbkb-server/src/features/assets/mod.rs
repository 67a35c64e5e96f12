//! Assets feature module
//!
//! Hands out presigned download links for materialized assets.

pub mod queries;
pub mod routes;

pub use routes::assets_routes;
