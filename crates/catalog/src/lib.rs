//! STAC catalog search for satellite scenes.
//!
//! The [`SceneCatalog`] trait is the seam the tile service depends on;
//! [`StacClient`] implements it against a STAC API `POST /search` endpoint
//! such as AWS Earth Search.

pub mod client;
pub mod error;
pub mod models;

pub use client::{StacClient, StacClientOptions, EARTH_SEARCH_URL, SENTINEL2_L2A};
pub use error::CatalogError;
pub use models::{CatalogResponse, SceneAsset, SceneMetadata, SceneQuery};

use async_trait::async_trait;

/// Anything that can answer a scene search.
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    /// Search for scenes; an empty result is `Ok` with no scenes.
    async fn search(&self, query: &SceneQuery) -> Result<CatalogResponse, CatalogError>;
}
