//! Caching for rendered scene tiles.
//!
//! Entries live in process memory, bounded by total byte weight and expired
//! after a fixed TTL. See [`TileCache`] for the eviction and deduplication
//! rules.

pub mod tile_cache;

pub use tile_cache::{CacheStats, CacheWeight, TileCache};
