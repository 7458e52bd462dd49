//! Coordinate reference system transformations.
//!
//! Implements the handful of projections satellite COGs are delivered in,
//! from scratch without external dependencies.

pub mod mercator;
pub mod utm;

pub use mercator::{lonlat_to_mercator, mercator_to_lonlat};
pub use utm::Utm;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedEpsg(u32),
}

/// A source CRS identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crs {
    /// EPSG:4326, degrees
    Geographic,
    /// EPSG:3857, meters
    WebMercator,
    /// EPSG:326xx / 327xx
    Utm(Utm),
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Result<Self, ProjectionError> {
        match epsg {
            4326 => Ok(Crs::Geographic),
            3857 | 900913 => Ok(Crs::WebMercator),
            _ => Utm::from_epsg(epsg)
                .map(Crs::Utm)
                .ok_or(ProjectionError::UnsupportedEpsg(epsg)),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Geographic => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm(utm) => utm.epsg(),
        }
    }

    /// Project WGS84 lon/lat (degrees) into this CRS.
    pub fn from_lonlat(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Crs::Geographic => (lon, lat),
            Crs::WebMercator => lonlat_to_mercator(lon, lat),
            Crs::Utm(utm) => utm.forward(lon, lat),
        }
    }

    /// Project a Web Mercator point into this CRS.
    pub fn from_mercator(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::WebMercator => (x, y),
            _ => {
                let (lon, lat) = mercator_to_lonlat(x, y);
                self.from_lonlat(lon, lat)
            }
        }
    }
}
