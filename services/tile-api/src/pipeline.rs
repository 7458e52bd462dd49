//! The on-demand tile pipeline.
//!
//! catalog search → concurrent band fetch → band algebra or pass-through →
//! colorize → PNG, memoized per [`TileCacheKey`].

use band_math::{evaluate, ExprError, Formula};
use bytes::Bytes;
use catalog::{CatalogError, SceneCatalog, SceneMetadata, SceneQuery};
use cog_reader::{CogError, TileFetcher};
use renderer::{colorize, encode_png, passthrough};
use scene_common::{RasterTile, ServiceError, ServiceResult, TileCoord, TimeWindow, ZoomRange};
use std::sync::Arc;
use storage::{CacheStats, CacheWeight, TileCache};
use tracing::{debug, info, instrument};

use crate::metrics::{MetricsCollector, Timer};

/// A validated-on-render tile request.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub tile: TileCoord,
    pub window: TimeWindow,
    pub cloud_cover: u32,
    pub band1: String,
    pub band2: Option<String>,
    pub formula: String,
}

/// Everything that determines a rendered tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub tile: TileCoord,
    pub window: TimeWindow,
    pub cloud_cover: u32,
    pub band1: String,
    pub band2: Option<String>,
    pub formula: String,
}

impl From<&TileRequest> for TileCacheKey {
    fn from(req: &TileRequest) -> Self {
        Self {
            tile: req.tile,
            window: req.window,
            cloud_cover: req.cloud_cover,
            band1: req.band1.clone(),
            band2: req.band2.clone(),
            formula: req.formula.clone(),
        }
    }
}

/// PNG bytes plus the scene they were rendered from.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub png: Bytes,
    pub scene: Arc<SceneMetadata>,
}

impl CacheWeight for RenderedTile {
    fn weight(&self) -> u64 {
        // scene metadata is small next to the image
        self.png.len() as u64 + 1024
    }
}

/// Result of [`TilePipeline::render`].
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub tile: RenderedTile,
    pub cache_hit: bool,
    pub elapsed_secs: f64,
}

pub struct TilePipeline {
    catalog: Arc<dyn SceneCatalog>,
    fetcher: Arc<dyn TileFetcher>,
    cache: TileCache<TileCacheKey, RenderedTile>,
    zoom_range: ZoomRange,
    metrics: Arc<MetricsCollector>,
}

impl TilePipeline {
    pub fn new(
        catalog: Arc<dyn SceneCatalog>,
        fetcher: Arc<dyn TileFetcher>,
        cache: TileCache<TileCacheKey, RenderedTile>,
        zoom_range: ZoomRange,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            cache,
            zoom_range,
            metrics,
        }
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom_range
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Render a tile, serving it from cache when an identical request was
    /// rendered within the TTL.
    ///
    /// Request errors are reported before the catalog or fetcher is touched.
    #[instrument(skip(self, req), fields(
        z = req.tile.z, x = req.tile.x, y = req.tile.y,
        band1 = %req.band1, band2 = ?req.band2,
    ))]
    pub async fn render(&self, req: &TileRequest) -> ServiceResult<TileResponse> {
        let timer = Timer::start();
        let result = self.render_inner(req).await;

        match &result {
            Ok((_, cache_hit)) => self.metrics.record_tile(timer.elapsed_us(), true, *cache_hit),
            Err(_) => self.metrics.record_tile(timer.elapsed_us(), false, false),
        }

        let (tile, cache_hit) = result?;
        let elapsed_secs = timer.elapsed_secs();
        info!(cache_hit, elapsed_ms = (elapsed_secs * 1000.0) as u64, bytes = tile.png.len(), "Tile served");
        Ok(TileResponse {
            tile,
            cache_hit,
            elapsed_secs,
        })
    }

    async fn render_inner(&self, req: &TileRequest) -> ServiceResult<(RenderedTile, bool)> {
        let formula = self.validate(req)?;

        let mut computed = false;
        let tile = self
            .cache
            .get_or_compute(TileCacheKey::from(req), || {
                computed = true;
                self.compute(req, formula)
            })
            .await?;
        Ok((tile, !computed))
    }

    /// Check everything that can be checked without I/O.
    fn validate(&self, req: &TileRequest) -> ServiceResult<Formula> {
        req.tile
            .validate(&self.zoom_range)
            .map_err(ServiceError::InvalidRequest)?;

        if req.band1.trim().is_empty() {
            return Err(ServiceError::invalid("Band1 is required"));
        }

        let formula = Formula::parse(&req.formula)
            .map_err(|e| ServiceError::invalid(format!("Invalid formula: {e}")))?;

        if formula.uses_band2() && req.band2.is_none() {
            return Err(ServiceError::invalid(
                "Formula references band2 but no band2 was given",
            ));
        }
        Ok(formula)
    }

    async fn compute(&self, req: &TileRequest, formula: Formula) -> ServiceResult<RenderedTile> {
        let scene = self.find_scene(req).await?;

        let href1 = asset_href(&scene, &req.band1)?;
        let href2 = req
            .band2
            .as_deref()
            .map(|band| asset_href(&scene, band))
            .transpose()?;

        let timer = Timer::start();
        let (band1, band2) = match href2 {
            Some(href2) => {
                let (b1, b2) = tokio::try_join!(
                    self.fetcher.fetch_tile(href1, req.tile),
                    self.fetcher.fetch_tile(href2, req.tile),
                )
                .map_err(decode_error)?;
                (b1, Some(b2))
            }
            None => (
                self.fetcher
                    .fetch_tile(href1, req.tile)
                    .await
                    .map_err(decode_error)?,
                None,
            ),
        };
        self.metrics
            .record_band_fetch(timer.elapsed_us(), 1 + band2.is_some() as usize);
        debug!(scene = %scene.id, channels = band1.channels, "Band tiles fetched");

        let png = tokio::task::spawn_blocking(move || render_bands(&formula, &band1, band2.as_ref()))
            .await
            .map_err(|e| ServiceError::Internal(format!("render task failed: {e}")))??;

        Ok(RenderedTile {
            png: Bytes::from(png),
            scene: Arc::new(scene),
        })
    }

    async fn find_scene(&self, req: &TileRequest) -> ServiceResult<SceneMetadata> {
        let query = SceneQuery::new(req.tile.lonlat_bounds(), req.window, req.cloud_cover, 1);

        let timer = Timer::start();
        let result = self.catalog.search(&query).await;
        self.metrics
            .record_catalog_search(timer.elapsed_us(), result.is_ok());

        let response = result.map_err(catalog_error)?;
        let scene = response
            .scenes
            .into_iter()
            .next()
            .ok_or(ServiceError::NoMatchingScene)?;

        debug!(scene = %scene.id, datetime = ?scene.datetime, cloud_cover = ?scene.cloud_cover, "Scene selected");
        Ok(scene)
    }
}

fn asset_href<'a>(scene: &'a SceneMetadata, band: &str) -> ServiceResult<&'a str> {
    scene.asset_href(band).ok_or_else(|| {
        ServiceError::invalid(format!("Band '{}' is not available in scene {}", band, scene.id))
    })
}

fn catalog_error(err: CatalogError) -> ServiceError {
    ServiceError::CatalogUnavailable(err.to_string())
}

fn decode_error(err: CogError) -> ServiceError {
    ServiceError::DecodeError(err.to_string())
}

/// Turn fetched band tiles into PNG bytes.
///
/// | Input | Result |
/// |---|---|
/// | two bands | formula over both, colorized |
/// | one single-channel band | formula over `band1`, colorized |
/// | one multi-channel band | channels used directly as RGB |
pub fn render_bands(
    formula: &Formula,
    band1: &RasterTile,
    band2: Option<&RasterTile>,
) -> ServiceResult<Vec<u8>> {
    let image = if band2.is_some() || band1.channels == 1 {
        let derived = evaluate(formula, band1, band2).map_err(|e| match e {
            ExprError::ShapeMismatch(..) => ServiceError::DecodeError(e.to_string()),
            other => ServiceError::invalid(other.to_string()),
        })?;
        colorize(&derived)
    } else {
        passthrough(band1)
    };

    encode_png(&image).map_err(|e| ServiceError::Internal(format!("PNG encoding failed: {e}")))
}
