//! Image rendering for derived satellite tiles.
//!
//! - Color ramp lookup (RdYlGn)
//! - Normalization and colorization of derived rasters
//! - Pass-through of pre-composited visual tiles
//! - PNG encoding (indexed or RGB)

pub mod colorize;
pub mod png;
pub mod ramp;

pub use colorize::{colorize, passthrough, RgbImage};
pub use png::encode_png;
pub use ramp::ColorRamp;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Image dimensions must be non-zero, got {0}x{1}")]
    EmptyImage(usize, usize),

    #[error("IDAT compression failed: {0}")]
    Compression(#[from] std::io::Error),
}
