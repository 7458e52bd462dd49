//! Turning rasters into RGB images.

use crate::ramp::{ColorRamp, Rgb};
use rayon::prelude::*;
use scene_common::{DerivedRaster, RasterTile};

/// Normalized value assigned to every valid pixel of a constant raster.
pub const CONSTANT_FALLBACK: f64 = 0.5;

/// Color for masked pixels: a colormap's transparent "bad" color with the
/// alpha channel dropped.
pub const MASKED_COLOR: Rgb = Rgb::BLACK;

/// Row-major, pixel-interleaved 8-bit RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 3],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = (y * self.width + x) * 3;
        Rgb::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2])
    }
}

/// Linear normalization bounds taken from the valid pixels of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Every pixel is masked.
    Empty,
    /// All valid pixels share one value.
    Constant(f64),
    Linear { min: f64, max: f64 },
}

impl Normalization {
    pub fn of(raster: &DerivedRaster) -> Self {
        match raster.valid_range() {
            None => Normalization::Empty,
            Some((min, max)) if max - min <= 0.0 => Normalization::Constant(min),
            Some((min, max)) => Normalization::Linear { min, max },
        }
    }

    /// Map a value into [0, 1].
    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        match *self {
            Normalization::Linear { min, max } => ((v - min) / (max - min)).clamp(0.0, 1.0),
            Normalization::Constant(_) | Normalization::Empty => CONSTANT_FALLBACK,
        }
    }
}

/// Colorize a derived raster through the RdYlGn ramp.
pub fn colorize(raster: &DerivedRaster) -> RgbImage {
    colorize_with(raster, &ColorRamp::rdylgn())
}

/// Colorize a derived raster through `ramp`.
pub fn colorize_with(raster: &DerivedRaster, ramp: &ColorRamp) -> RgbImage {
    let norm = Normalization::of(raster);
    let mut image = RgbImage::new(raster.width, raster.height);

    if let Normalization::Empty = norm {
        tracing::debug!("all pixels masked, rendering blank tile");
        return image;
    }

    image
        .pixels
        .par_chunks_mut(3)
        .zip(raster.values.par_iter().zip(raster.valid.par_iter()))
        .for_each(|(px, (&v, &ok))| {
            let c = if ok { ramp.color_at(norm.apply(v)) } else { MASKED_COLOR };
            px[0] = c.r;
            px[1] = c.g;
            px[2] = c.b;
        });

    image
}

/// Use a multi-channel tile directly as RGB.
///
/// Three or more channels map the first three to R, G, B. Fewer channels
/// are rendered as grey from channel 0. Samples are clamped to [0, 255];
/// masked pixels are black.
pub fn passthrough(tile: &RasterTile) -> RgbImage {
    let mut image = RgbImage::new(tile.width, tile.height);
    if tile.channels == 0 {
        return image;
    }

    let interleaved = tile.to_interleaved();
    let channels = tile.channels;
    let to_u8 = |v: f32| v.clamp(0.0, 255.0) as u8;

    for (px, (src, &ok)) in image
        .pixels
        .chunks_exact_mut(3)
        .zip(interleaved.chunks_exact(channels).zip(&tile.valid))
    {
        if !ok {
            continue;
        }
        if channels >= 3 {
            px[0] = to_u8(src[0]);
            px[1] = to_u8(src[1]);
            px[2] = to_u8(src[2]);
        } else {
            let grey = to_u8(src[0]);
            px.fill(grey);
        }
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_raster_uses_mid_value() {
        let raster = DerivedRaster::new(2, 2, vec![3.0; 4], vec![true; 4]);
        let image = colorize(&raster);
        let mid = ColorRamp::rdylgn().color_at(CONSTANT_FALLBACK);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(image.pixel(x, y), mid);
            }
        }
    }

    #[test]
    fn test_all_masked_is_black() {
        let raster = DerivedRaster::new(3, 1, vec![f64::NAN; 3], vec![false; 3]);
        let image = colorize(&raster);
        assert!(image.pixels.iter().all(|b| *b == 0));
        assert_eq!(image.pixels.len(), 9);
    }

    #[test]
    fn test_min_max_map_to_ramp_ends() {
        let raster = DerivedRaster::new(3, 1, vec![-1.0, 0.0, 1.0], vec![true, false, true]);
        let image = colorize(&raster);
        let ramp = ColorRamp::rdylgn();
        assert_eq!(image.pixel(0, 0), ramp.color_at(0.0));
        assert_eq!(image.pixel(1, 0), MASKED_COLOR);
        assert_eq!(image.pixel(2, 0), ramp.color_at(1.0));
    }

    #[test]
    fn test_normalization_kinds() {
        let empty = DerivedRaster::new(1, 1, vec![0.0], vec![false]);
        assert_eq!(Normalization::of(&empty), Normalization::Empty);
        let flat = DerivedRaster::new(1, 2, vec![2.0, 2.0], vec![true, true]);
        assert_eq!(Normalization::of(&flat), Normalization::Constant(2.0));
        assert_eq!(Normalization::of(&flat).apply(2.0), 0.5);
    }

    #[test]
    fn test_passthrough_rgb() {
        let tile = RasterTile::new(
            2,
            1,
            3,
            vec![10.0, 20.0, 30.0, 40.0, 300.0, -5.0],
            vec![true, true],
        );
        let image = passthrough(&tile);
        assert_eq!(image.pixels, vec![10, 30, 255, 20, 40, 0]);
    }

    #[test]
    fn test_passthrough_masked_and_two_channel() {
        let tile = RasterTile::new(2, 1, 2, vec![50.0, 60.0, 255.0, 255.0], vec![true, false]);
        let image = passthrough(&tile);
        assert_eq!(image.pixels, vec![50, 50, 50, 0, 0, 0]);
    }
}
