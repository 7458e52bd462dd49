//! In-memory raster grids passed between pipeline stages.

/// A decoded multi-channel tile.
///
/// `data` is band-sequential: all pixels of channel 0, then channel 1, and so
/// on, each channel in row-major order. `valid` has one flag per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
    pub valid: Vec<bool>,
}

impl RasterTile {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<f32>, valid: Vec<bool>) -> Self {
        debug_assert_eq!(data.len(), width * height * channels);
        debug_assert_eq!(valid.len(), width * height);
        Self {
            width,
            height,
            channels,
            data,
            valid,
        }
    }

    /// Single-channel tile with every pixel valid.
    pub fn from_band(width: usize, height: usize, data: Vec<f32>) -> Self {
        let valid = vec![true; width * height];
        Self::new(width, height, 1, data, valid)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Samples of one channel in row-major order.
    pub fn channel(&self, index: usize) -> &[f32] {
        let n = self.pixel_count();
        &self.data[index * n..(index + 1) * n]
    }

    /// Reorder samples into pixel-interleaved layout (RGBRGB...).
    pub fn to_interleaved(&self) -> Vec<f32> {
        let n = self.pixel_count();
        let mut out = Vec::with_capacity(self.data.len());
        for px in 0..n {
            for c in 0..self.channels {
                out.push(self.data[c * n + px]);
            }
        }
        out
    }
}

/// A single-channel floating-point grid with a validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRaster {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
    pub valid: Vec<bool>,
}

impl DerivedRaster {
    pub fn new(width: usize, height: usize, values: Vec<f64>, valid: Vec<bool>) -> Self {
        debug_assert_eq!(values.len(), width * height);
        debug_assert_eq!(valid.len(), width * height);
        Self {
            width,
            height,
            values,
            valid,
        }
    }

    /// Min and max over valid pixels, or `None` when everything is masked.
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .zip(&self.valid)
            .filter(|(_, ok)| **ok)
            .fold(None, |acc, (&v, _)| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }
}
