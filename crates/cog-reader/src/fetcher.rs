//! Tile fetching by asset reference, with a cache of opened headers.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use scene_common::{RasterTile, TileCoord, TILE_SIZE};
use tracing::debug;

use crate::error::{CogError, Result};
use crate::reader::CogReader;
use crate::source::{FileRangeSource, HttpRangeSource, RangeSource};

/// Decodes one fixed-size tile of a raster asset.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch_tile(&self, asset_href: &str, tile: TileCoord) -> Result<RasterTile>;
}

/// Configuration for [`CogTileFetcher`].
#[derive(Debug, Clone)]
pub struct CogFetcherOptions {
    pub request_timeout: Duration,
    /// Number of parsed COG headers kept in memory.
    pub header_cache_entries: usize,
    pub tile_size: usize,
}

impl Default for CogFetcherOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            header_cache_entries: 64,
            tile_size: TILE_SIZE,
        }
    }
}

/// [`TileFetcher`] over COGs on HTTP(S) or the local filesystem.
pub struct CogTileFetcher {
    client: reqwest::Client,
    readers: Mutex<LruCache<String, Arc<CogReader>>>,
    tile_size: usize,
}

impl CogTileFetcher {
    pub fn new(options: CogFetcherOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        let capacity = NonZeroUsize::new(options.header_cache_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client,
            readers: Mutex::new(LruCache::new(capacity)),
            tile_size: options.tile_size,
        })
    }

    /// Pick a byte source for an asset reference.
    pub fn source_for(&self, href: &str) -> Arc<dyn RangeSource> {
        if href.starts_with("http://") || href.starts_with("https://") {
            Arc::new(HttpRangeSource::new(self.client.clone(), href))
        } else {
            let path = href.strip_prefix("file://").unwrap_or(href);
            Arc::new(FileRangeSource::new(PathBuf::from(path)))
        }
    }

    /// Opened reader for `href`, parsing the header on first use.
    pub async fn reader(&self, href: &str) -> Result<Arc<CogReader>> {
        let cached = self.readers.lock().get(href).cloned();
        if let Some(reader) = cached {
            return Ok(reader);
        }

        // Two callers racing on a cold header both parse it; the second
        // insert simply replaces the first.
        let reader = Arc::new(CogReader::open(self.source_for(href)).await?);
        debug!(asset = href, "cached COG header");
        self.readers.lock().put(href.to_string(), reader.clone());
        Ok(reader)
    }

    pub fn cached_headers(&self) -> usize {
        self.readers.lock().len()
    }
}

#[async_trait]
impl TileFetcher for CogTileFetcher {
    async fn fetch_tile(&self, asset_href: &str, tile: TileCoord) -> Result<RasterTile> {
        let reader = self.reader(asset_href).await?;
        reader.read_xyz(tile, self.tile_size).await
    }
}
