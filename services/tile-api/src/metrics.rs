//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the tile service.
///
/// Every record call updates both the in-process counters (served as JSON)
/// and the global `metrics` recorder (served as Prometheus text).
#[derive(Debug)]
pub struct MetricsCollector {
    pub tile_requests: AtomicU64,
    pub tile_errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub catalog_searches: AtomicU64,
    pub catalog_errors: AtomicU64,
    pub progress_broadcasts: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,

    render_times: RwLock<TimingStats>,
    catalog_times: RwLock<TimingStats>,
    fetch_times: RwLock<TimingStats>,

    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn summary(&self) -> TimingSummary {
        TimingSummary {
            count: self.count,
            avg_ms: if self.count == 0 {
                0.0
            } else {
                (self.total_us as f64 / self.count as f64) / 1000.0
            },
            min_ms: self.min_us as f64 / 1000.0,
            max_ms: self.max_us as f64 / 1000.0,
            last_ms: self.last_us as f64 / 1000.0,
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tile_requests: AtomicU64::new(0),
            tile_errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            catalog_searches: AtomicU64::new(0),
            catalog_errors: AtomicU64::new(0),
            progress_broadcasts: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            render_times: RwLock::new(TimingStats::default()),
            catalog_times: RwLock::new(TimingStats::default()),
            fetch_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Record a finished tile request and whether it was served from cache.
    pub fn record_tile(&self, duration_us: u64, success: bool, cache_hit: bool) {
        self.tile_requests.fetch_add(1, Ordering::Relaxed);
        counter!("tile_requests_total").increment(1);

        if !success {
            self.tile_errors.fetch_add(1, Ordering::Relaxed);
            counter!("tile_errors_total").increment(1);
            return;
        }

        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            counter!("tile_cache_hits_total").increment(1);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            counter!("tile_cache_misses_total").increment(1);
            histogram!("tile_render_duration_ms").record(duration_us as f64 / 1000.0);
            self.render_times.write().record(duration_us);
        }
    }

    pub fn record_catalog_search(&self, duration_us: u64, success: bool) {
        self.catalog_searches.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.catalog_errors.fetch_add(1, Ordering::Relaxed);
            counter!("catalog_errors_total").increment(1);
        }
        counter!("catalog_searches_total").increment(1);
        histogram!("catalog_search_duration_ms").record(duration_us as f64 / 1000.0);
        self.catalog_times.write().record(duration_us);
    }

    /// Record the time spent fetching all band tiles of one request.
    pub fn record_band_fetch(&self, duration_us: u64, bands: usize) {
        counter!("band_tiles_fetched_total").increment(bands as u64);
        histogram!("band_fetch_duration_ms").record(duration_us as f64 / 1000.0);
        self.fetch_times.write().record(duration_us);
    }

    pub fn record_broadcast(&self, delivered: usize, dropped: usize) {
        self.progress_broadcasts.fetch_add(1, Ordering::Relaxed);
        counter!("progress_broadcasts_total").increment(1);
        counter!("progress_messages_delivered_total").increment(delivered as u64);
        if dropped > 0 {
            counter!("progress_connections_dropped_total").increment(dropped as u64);
        }
    }

    pub fn record_job(&self, outcome: &'static str) {
        if outcome == "completed" {
            self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        counter!("compute_jobs_total", "outcome" => outcome).increment(1);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            (cache_hits as f64 / cache_total as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            tile_requests: self.tile_requests.load(Ordering::Relaxed),
            tile_errors: self.tile_errors.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            catalog_searches: self.catalog_searches.load(Ordering::Relaxed),
            catalog_errors: self.catalog_errors.load(Ordering::Relaxed),
            progress_broadcasts: self.progress_broadcasts.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            render: self.render_times.read().summary(),
            catalog: self.catalog_times.read().summary(),
            band_fetch: self.fetch_times.read().summary(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,

    pub tile_requests: u64,
    pub tile_errors: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,

    pub catalog_searches: u64,
    pub catalog_errors: u64,

    pub progress_broadcasts: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,

    pub render: TimingSummary,
    pub catalog: TimingSummary,
    pub band_fetch: TimingSummary,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimingSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
