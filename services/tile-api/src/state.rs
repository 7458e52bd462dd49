//! Application state and shared resources.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use catalog::{SceneCatalog, StacClient};
use cog_reader::{CogTileFetcher, TileFetcher};
use storage::TileCache;

use crate::bands::BandCatalog;
use crate::config::ServiceConfig;
use crate::jobs::{AreaCompute, CommandCompute, JobRunner};
use crate::metrics::MetricsCollector;
use crate::pipeline::TilePipeline;
use crate::progress::ProgressRegistry;

/// Shared application state, handed to every handler.
pub struct AppState {
    pub config: ServiceConfig,
    /// Scene search, shared with the tile pipeline
    pub catalog: Arc<dyn SceneCatalog>,
    pub pipeline: TilePipeline,
    pub bands: BandCatalog,
    pub progress: Arc<ProgressRegistry>,
    pub jobs: JobRunner,
    pub metrics: Arc<MetricsCollector>,
    /// Prometheus renderer; absent when no recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Build production state: STAC client, COG fetcher and the external
    /// compute command, all configured from `config`.
    pub fn new(config: ServiceConfig, prometheus: Option<PrometheusHandle>) -> Result<Self> {
        let catalog: Arc<dyn SceneCatalog> = Arc::new(
            StacClient::new(config.catalog_options()).context("Failed to create STAC client")?,
        );
        let fetcher: Arc<dyn TileFetcher> = Arc::new(
            CogTileFetcher::new(config.fetcher_options())
                .context("Failed to create COG fetcher")?,
        );
        let engine: Arc<dyn AreaCompute> = Arc::new(CommandCompute::new(&config.compute_command));
        let bands = BandCatalog::load(config.bands_file.as_deref())?;

        info!(
            stac_api_url = %config.stac_api_url,
            collection = %config.stac_collection,
            bands = bands.len(),
            compute_command = %config.compute_command,
            "Application state configured"
        );

        Ok(Self::with_components(config, catalog, fetcher, engine, bands, prometheus))
    }

    /// Assemble state from explicit components.
    pub fn with_components(
        config: ServiceConfig,
        catalog: Arc<dyn SceneCatalog>,
        fetcher: Arc<dyn TileFetcher>,
        engine: Arc<dyn AreaCompute>,
        bands: BandCatalog,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let progress = Arc::new(ProgressRegistry::new());

        let cache = TileCache::new(config.tile_cache_size_mb, config.tile_cache_ttl);
        let pipeline = TilePipeline::new(
            catalog.clone(),
            fetcher,
            cache,
            config.zoom_range,
            metrics.clone(),
        );
        let jobs = JobRunner::new(
            engine,
            progress.clone(),
            metrics.clone(),
            config.compute_timeout,
            config.completed_job_history,
        );

        Self {
            config,
            catalog,
            pipeline,
            bands,
            progress,
            jobs,
            metrics,
            prometheus,
        }
    }
}
