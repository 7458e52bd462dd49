//! Fake collaborators for driving the service without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use catalog::{CatalogError, CatalogResponse, SceneCatalog, SceneQuery};
use cog_reader::{CogError, TileFetcher};
use parking_lot::Mutex;
use scene_common::{RasterTile, TileCoord};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tile_api::bands::BandCatalog;
use tile_api::config::ServiceConfig;
use tile_api::jobs::{AreaCompute, ComputeError, ComputeRequest};
use tile_api::state::AppState;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Catalog
// ============================================================================

pub enum CatalogReply {
    Items(Value),
    Status(u16),
}

pub struct FakeCatalog {
    reply: CatalogReply,
    pub calls: AtomicUsize,
    pub last_query: Mutex<Option<SceneQuery>>,
}

impl FakeCatalog {
    pub fn with_items(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            reply: CatalogReply::Items(test_utils::stac_collection(items)),
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: CatalogReply::Status(status),
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SceneCatalog for FakeCatalog {
    async fn search(&self, query: &SceneQuery) -> Result<CatalogResponse, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query.clone());
        match &self.reply {
            CatalogReply::Items(raw) => CatalogResponse::from_json(raw.clone()),
            CatalogReply::Status(status) => Err(CatalogError::Unavailable {
                status: *status,
                body: "upstream down".into(),
            }),
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

pub struct FakeFetcher {
    tiles: HashMap<String, RasterTile>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(tiles: Vec<(&str, RasterTile)>) -> Arc<Self> {
        Self::slow(tiles, Duration::ZERO)
    }

    pub fn slow(tiles: Vec<(&str, RasterTile)>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tiles: tiles.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileFetcher for FakeFetcher {
    async fn fetch_tile(&self, asset_href: &str, _tile: TileCoord) -> Result<RasterTile, CogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.tiles.get(asset_href).cloned().ok_or_else(|| CogError::Http {
            status: 404,
            url: asset_href.to_string(),
        })
    }
}

// ============================================================================
// Compute engine
// ============================================================================

pub enum EngineBehavior {
    Succeed,
    Fail(&'static str),
    /// Never finishes unless cancelled
    Hang,
}

pub struct FakeEngine {
    behavior: EngineBehavior,
    delay: Duration,
    pub requests: Mutex<Vec<ComputeRequest>>,
}

impl FakeEngine {
    pub fn new(behavior: EngineBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay: Duration::from_millis(10),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AreaCompute for FakeEngine {
    async fn compute(
        &self,
        request: &ComputeRequest,
        cancel: CancellationToken,
    ) -> Result<(), ComputeError> {
        self.requests.lock().push(request.clone());
        match self.behavior {
            EngineBehavior::Succeed => {
                tokio::time::sleep(self.delay).await;
                Ok(())
            }
            EngineBehavior::Fail(reason) => {
                tokio::time::sleep(self.delay).await;
                Err(ComputeError::Failed(reason.to_string()))
            }
            EngineBehavior::Hang => {
                cancel.cancelled().await;
                Err(ComputeError::Cancelled)
            }
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const RED_HREF: &str = "https://example.com/S2A_32TPS/B04.tif";
pub const NIR_HREF: &str = "https://example.com/S2A_32TPS/B08.tif";
pub const VISUAL_HREF: &str = "https://example.com/S2A_32TPS/TCI.tif";

/// A scene with red, nir and visual assets at 12.5% cloud cover.
pub fn scene() -> Value {
    test_utils::stac_item(
        "S2A_32TPS_20240610_0_L2A",
        12.5,
        &[("red", RED_HREF), ("nir", NIR_HREF), ("visual", VISUAL_HREF)],
    )
}

/// A single-band tile with every pixel set to `value`.
pub fn constant_band(size: usize, value: f32) -> RasterTile {
    RasterTile::from_band(size, size, vec![value; size * size])
}

/// A 3-channel tile with every pixel set to `rgb`.
pub fn constant_rgb(size: usize, rgb: [f32; 3]) -> RasterTile {
    let n = size * size;
    let mut data = Vec::with_capacity(3 * n);
    for c in rgb {
        data.extend(std::iter::repeat(c).take(n));
    }
    RasterTile::new(size, size, 3, data, vec![true; n])
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub catalog: Arc<FakeCatalog>,
    pub fetcher: Arc<FakeFetcher>,
    pub engine: Arc<FakeEngine>,
}

pub fn test_app(catalog: Arc<FakeCatalog>, fetcher: Arc<FakeFetcher>) -> TestApp {
    test_app_with(catalog, fetcher, FakeEngine::new(EngineBehavior::Succeed), ServiceConfig::default())
}

pub fn test_app_with(
    catalog: Arc<FakeCatalog>,
    fetcher: Arc<FakeFetcher>,
    engine: Arc<FakeEngine>,
    config: ServiceConfig,
) -> TestApp {
    let state = Arc::new(AppState::with_components(
        config,
        catalog.clone(),
        fetcher.clone(),
        engine.clone(),
        BandCatalog::sentinel2().unwrap(),
        None,
    ));
    TestApp {
        state,
        catalog,
        fetcher,
        engine,
    }
}
