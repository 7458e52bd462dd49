//! Common types shared by the scene tile crates and services.

pub mod bbox;
pub mod error;
pub mod raster;
pub mod tile;
pub mod time;

pub use bbox::{BboxParseError, BoundingBox};
pub use error::{ServiceError, ServiceResult};
pub use raster::{DerivedRaster, RasterTile};
pub use tile::{latlon_to_tile, TileCoord, ZoomRange, MERCATOR_MAX_EXTENT, TILE_SIZE};
pub use time::{Lookback, TimeParseError, TimeWindow};
