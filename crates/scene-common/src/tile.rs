//! XYZ tile coordinates in the Web Mercator (Google/OSM) scheme.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Edge length of a rendered tile in pixels.
pub const TILE_SIZE: usize = 256;

/// Half the Web Mercator world extent in meters.
pub const MERCATOR_MAX_EXTENT: f64 = 20037508.342789244;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y), counted from the north edge
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Number of tiles along one axis at this zoom.
    pub fn matrix_size(&self) -> u64 {
        1u64 << self.z.min(32)
    }

    /// Check the zoom against `range` and x/y against the tile matrix.
    pub fn validate(&self, range: &ZoomRange) -> Result<(), String> {
        if !range.contains(self.z) {
            return Err(range.error_message());
        }
        let n = self.matrix_size();
        if u64::from(self.x) >= n || u64::from(self.y) >= n {
            return Err(format!(
                "Tile ({}, {}) is outside the tile matrix at zoom {} (0..{})",
                self.x, self.y, self.z, n
            ));
        }
        Ok(())
    }

    /// WGS84 bounds (degrees) of this tile.
    pub fn lonlat_bounds(&self) -> BoundingBox {
        let n = self.matrix_size() as f64;

        let lon_min = self.x as f64 / n * 360.0 - 180.0;
        let lon_max = (self.x as f64 + 1.0) / n * 360.0 - 180.0;

        let lat_max = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        let lat_min = (PI * (1.0 - 2.0 * (self.y as f64 + 1.0) / n))
            .sinh()
            .atan()
            .to_degrees();

        BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
    }

    /// EPSG:3857 bounds (meters) of this tile.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let span = 2.0 * MERCATOR_MAX_EXTENT / self.matrix_size() as f64;
        let min_x = -MERCATOR_MAX_EXTENT + self.x as f64 * span;
        let max_y = MERCATOR_MAX_EXTENT - self.y as f64 * span;
        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }
}

/// Inclusive range of zoom levels the tile endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u32,
    pub max: u32,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 10, max: 16 }
    }
}

impl ZoomRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, z: u32) -> bool {
        z >= self.min && z <= self.max
    }

    pub fn error_message(&self) -> String {
        format!("Zoom level must be between {} and {}", self.min, self.max)
    }
}

/// Convert lat/lon to the Web Mercator tile containing it.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u32) -> TileCoord {
    let n = (1u64 << zoom) as f64;

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, n - 1.0) as u32;
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n)
        .floor()
        .clamp(0.0, n - 1.0) as u32;

    TileCoord { z: zoom, x, y }
}
