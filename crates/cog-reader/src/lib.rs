//! Cloud Optimized GeoTIFF reading.
//!
//! Reads single XYZ tiles out of tiled GeoTIFFs without downloading the
//! whole file: the header is parsed once, then only the internal tiles that
//! cover the requested area are fetched with byte-range reads.
//!
//! Supported inputs: classic TIFF in either byte order, tiled chunky
//! layout, no/LZW/deflate compression with optional horizontal predictor,
//! and rasters in EPSG:3857, EPSG:4326 or WGS84 UTM zones.

pub mod decompress;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod geotiff;
pub mod ifd;
pub mod reader;
pub mod source;

pub use error::{CogError, Result};
pub use fetcher::{CogFetcherOptions, CogTileFetcher, TileFetcher};
pub use geotiff::{GeoInfo, GeoTransform};
pub use reader::{CogMetadata, CogReader, ImageLevel};
pub use source::{FileRangeSource, HttpRangeSource, MemorySource, RangeSource};
