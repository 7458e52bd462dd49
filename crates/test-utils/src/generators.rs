//! Test data generators for synthetic band rasters.
//!
//! Values follow simple closed-form patterns so tests can assert on exact
//! pixels after a read.

/// Grid where each cell is `col + row * 1000`.
///
/// # Example
///
/// ```
/// use test_utils::create_index_grid;
///
/// let grid = create_index_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1.0);
/// assert_eq!(grid[10], 1000.0);
/// ```
pub fn create_index_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col + row * 1000) as f32);
        }
    }
    data
}

/// Reflectance-like values (scaled by 10 000, as Sentinel-2 L2A stores them)
/// rising from `low` at the left edge to `high` at the right edge.
pub fn create_reflectance_ramp(width: usize, height: usize, low: f32, high: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..height {
        for col in 0..width {
            let t = col as f32 / (width.max(2) - 1) as f32;
            data.push((low + t * (high - low)).round());
        }
    }
    data
}

/// Every cell set to `value`.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Copy of `data` with every `every`-th cell replaced by `nodata`.
pub fn with_nodata(data: &[f32], every: usize, nodata: f32) -> Vec<f32> {
    data.iter()
        .enumerate()
        .map(|(i, &v)| if every > 0 && i % every == 0 { nodata } else { v })
        .collect()
}

/// Pixel-interleaved RGB grid: R = column, G = row, B = constant 128.
pub fn create_rgb_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            data.extend_from_slice(&[(col % 256) as f32, (row % 256) as f32, 128.0]);
        }
    }
    data
}
