//! Tile API service.
//!
//! HTTP server rendering band-algebra tiles from Sentinel-2 imagery.

use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tile_api::config::ServiceConfig;
use tile_api::create_router;
use tile_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "tile-api")]
#[command(about = "Satellite band-algebra tile server")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "TILE_API_LISTEN", default_value = "0.0.0.0:8000")]
    listen: String,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long, env = "TOKIO_WORKER_THREADS")]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics exporter initialized");

    let config = ServiceConfig::from_env()?;
    info!(
        min_zoom = config.zoom_range.min,
        max_zoom = config.zoom_range.max,
        cache_ttl_secs = config.tile_cache_ttl.as_secs(),
        cache_size_mb = config.tile_cache_size_mb,
        "Starting tile API server"
    );

    let state = Arc::new(AppState::new(config, Some(prometheus_handle))?);
    let app = create_router(state.clone());

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", args.listen))?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.jobs.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for shutdown signal");
            std::future::pending::<()>().await
        }
    }
}
