//! Shared test utilities for the scene-tiles workspace.
//!
//! - [`GeoTiffBuilder`]: writes small tiled GeoTIFFs with chosen compression,
//!   byte order, sample type, geokeys and overviews
//! - [`generators`]: band rasters with known values
//! - [`fixtures`]: STAC items and search responses
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod geotiff;

pub use fixtures::*;
pub use generators::*;
pub use geotiff::{Compression, GeoTiffBuilder, SampleType};

/// Fresh temporary directory, removed on drop.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("scene-tiles-test-")
        .tempdir()
        .expect("Failed to create temp directory")
}
