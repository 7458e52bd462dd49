//! Service configuration.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use catalog::{StacClientOptions, EARTH_SEARCH_URL, SENTINEL2_L2A};
use cog_reader::CogFetcherOptions;
use scene_common::ZoomRange;

/// Runtime configuration for the tile service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// STAC `POST /search` endpoint
    pub stac_api_url: String,
    /// Collection searched for scenes
    pub stac_collection: String,
    pub catalog_timeout: Duration,
    pub catalog_max_retries: u32,

    /// Timeout for each COG range request
    pub cog_timeout: Duration,
    /// Number of parsed COG headers kept in memory
    pub cog_header_cache_entries: usize,

    /// Lifetime of a rendered tile in the cache
    pub tile_cache_ttl: Duration,
    pub tile_cache_size_mb: usize,

    pub zoom_range: ZoomRange,
    /// Cloud cover ceiling used when a request omits one
    pub default_cloud_cover: u32,

    /// Band metadata JSON; the embedded Sentinel-2 table when unset
    pub bands_file: Option<PathBuf>,

    /// Program run for area computations
    pub compute_command: String,
    pub compute_timeout: Duration,
    /// Finished jobs kept for status queries
    pub completed_job_history: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stac_api_url: EARTH_SEARCH_URL.to_string(),
            stac_collection: SENTINEL2_L2A.to_string(),
            catalog_timeout: Duration::from_secs(30),
            catalog_max_retries: 2,
            cog_timeout: Duration::from_secs(30),
            cog_header_cache_entries: 64,
            tile_cache_ttl: Duration::from_secs(3600),
            tile_cache_size_mb: 256,
            zoom_range: ZoomRange::default(),
            default_cloud_cover: 30,
            bands_file: None,
            compute_command: "scog-compute".to_string(),
            compute_timeout: Duration::from_secs(3600),
            completed_job_history: 100,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let zoom_range = ZoomRange::new(
            env_parse("MIN_ZOOM", defaults.zoom_range.min)?,
            env_parse("MAX_ZOOM", defaults.zoom_range.max)?,
        );
        if zoom_range.min > zoom_range.max {
            anyhow::bail!(
                "MIN_ZOOM ({}) must not exceed MAX_ZOOM ({})",
                zoom_range.min,
                zoom_range.max
            );
        }

        Ok(Self {
            stac_api_url: env::var("STAC_API_URL").unwrap_or(defaults.stac_api_url),
            stac_collection: env::var("STAC_COLLECTION").unwrap_or(defaults.stac_collection),
            catalog_timeout: Duration::from_secs(env_parse("CATALOG_TIMEOUT_SECS", 30)?),
            catalog_max_retries: env_parse("CATALOG_MAX_RETRIES", defaults.catalog_max_retries)?,
            cog_timeout: Duration::from_secs(env_parse("COG_TIMEOUT_SECS", 30)?),
            cog_header_cache_entries: env_parse(
                "COG_HEADER_CACHE_ENTRIES",
                defaults.cog_header_cache_entries,
            )?,
            tile_cache_ttl: Duration::from_secs(env_parse("TILE_CACHE_TTL_SECS", 3600)?),
            tile_cache_size_mb: env_parse("TILE_CACHE_SIZE_MB", defaults.tile_cache_size_mb)?,
            zoom_range,
            default_cloud_cover: env_parse("DEFAULT_CLOUD_COVER", defaults.default_cloud_cover)?,
            bands_file: env::var("BANDS_FILE").ok().map(PathBuf::from),
            compute_command: env::var("COMPUTE_COMMAND").unwrap_or(defaults.compute_command),
            compute_timeout: Duration::from_secs(env_parse("COMPUTE_TIMEOUT_SECS", 3600)?),
            completed_job_history: env_parse(
                "COMPLETED_JOB_HISTORY",
                defaults.completed_job_history,
            )?,
        })
    }

    pub fn catalog_options(&self) -> StacClientOptions {
        StacClientOptions {
            search_url: self.stac_api_url.clone(),
            collection: self.stac_collection.clone(),
            request_timeout: self.catalog_timeout,
            max_retries: self.catalog_max_retries,
            ..StacClientOptions::default()
        }
    }

    pub fn fetcher_options(&self) -> CogFetcherOptions {
        CogFetcherOptions {
            request_timeout: self.cog_timeout,
            header_cache_entries: self.cog_header_cache_entries,
            ..CogFetcherOptions::default()
        }
    }
}

/// Parse `key` from the environment, or return `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
