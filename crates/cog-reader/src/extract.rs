//! Mapping an XYZ tile onto the internal tile grid of one COG level.
//!
//! Sampling is nearest neighbour at output pixel centres. Each output pixel
//! is projected from Web Mercator into the source CRS and looked up in the
//! level's pixel grid.

use std::collections::{BTreeSet, HashMap};

use projection::Crs;
use scene_common::{RasterTile, TileCoord};

use crate::geotiff::GeoTransform;

/// Pixel and tile geometry of one image level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub transform: GeoTransform,
}

impl LevelGrid {
    pub fn tiles_across(&self) -> u32 {
        self.width.div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self) -> u32 {
        self.height.div_ceil(self.tile_height)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_across() as usize * self.tiles_down() as usize
    }

    /// Larger of the two pixel dimensions, in CRS units.
    pub fn resolution(&self) -> f64 {
        self.transform.pixel_width.max(self.transform.pixel_height)
    }

    /// Internal tile index and pixel offset inside that tile for a
    /// continuous pixel position, or `None` outside the image.
    #[inline]
    fn locate(&self, px: f64, py: f64) -> Option<(u32, u32)> {
        if !(px >= 0.0 && py >= 0.0 && px < self.width as f64 && py < self.height as f64) {
            return None;
        }
        let (col, row) = (px as u32, py as u32);
        let tile = (row / self.tile_height) * self.tiles_across() + col / self.tile_width;
        let offset = (row % self.tile_height) * self.tile_width + col % self.tile_width;
        Some((tile, offset))
    }
}

/// Where every output pixel comes from.
#[derive(Debug, Clone)]
pub struct SamplePlan {
    pub size: usize,
    /// Row-major, one entry per output pixel: (internal tile, pixel offset).
    pub samples: Vec<Option<(u32, u32)>>,
    /// Distinct internal tiles referenced by `samples`, ascending.
    pub tiles: Vec<u32>,
}

impl SamplePlan {
    /// True when no output pixel falls inside the image.
    pub fn is_outside(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Build the sampling plan for `tile` rendered at `size` x `size`.
pub fn plan_samples(grid: &LevelGrid, crs: &Crs, tile: TileCoord, size: usize) -> SamplePlan {
    let bounds = tile.mercator_bounds();
    let step_x = bounds.width() / size as f64;
    let step_y = bounds.height() / size as f64;

    let mut samples = Vec::with_capacity(size * size);
    let mut tiles = BTreeSet::new();

    for row in 0..size {
        let my = bounds.max_y - (row as f64 + 0.5) * step_y;
        for col in 0..size {
            let mx = bounds.min_x + (col as f64 + 0.5) * step_x;
            let (sx, sy) = crs.from_mercator(mx, my);
            let (px, py) = grid.transform.to_pixel(sx, sy);
            let hit = grid.locate(px, py);
            if let Some((t, _)) = hit {
                tiles.insert(t);
            }
            samples.push(hit);
        }
    }

    SamplePlan {
        size,
        samples,
        tiles: tiles.into_iter().collect(),
    }
}

/// Copy sampled pixels out of decoded internal tiles.
///
/// `decoded` holds pixel-interleaved samples per internal tile; tiles that
/// are absent (sparse or empty) leave their pixels masked. A pixel is masked
/// when every one of its samples is NaN or equal to `nodata`.
pub fn assemble(
    plan: &SamplePlan,
    decoded: &HashMap<u32, Vec<f32>>,
    samples_per_pixel: usize,
    nodata: Option<f64>,
) -> RasterTile {
    let n = plan.size * plan.size;
    let spp = samples_per_pixel;
    let mut data = vec![0f32; n * spp];
    let mut valid = vec![false; n];

    let is_empty = |v: f32| v.is_nan() || nodata.is_some_and(|nd| v as f64 == nd);

    for (i, sample) in plan.samples.iter().enumerate() {
        let Some((t, offset)) = *sample else { continue };
        let Some(tile) = decoded.get(&t) else { continue };

        let start = offset as usize * spp;
        let Some(px) = tile.get(start..start + spp) else { continue };

        for (c, &v) in px.iter().enumerate() {
            data[c * n + i] = v;
        }
        valid[i] = !px.iter().all(|&v| is_empty(v));
    }

    RasterTile::new(plan.size, plan.size, spp, data, valid)
}
