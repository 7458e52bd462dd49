//! GeoTIFF georeferencing: affine placement, CRS and nodata.

use projection::Crs;

use crate::error::{CogError, Result};

/// GeoKey ids.
mod keys {
    pub const GT_MODEL_TYPE: u16 = 1024;
    pub const GT_RASTER_TYPE: u16 = 1025;
    pub const GEOGRAPHIC_TYPE: u16 = 2048;
    pub const PROJECTED_CS_TYPE: u16 = 3072;
}

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// North-up affine placement of a raster.
///
/// `origin_x`/`origin_y` is the outer corner of the top-left pixel; pixel
/// sizes are positive with rows running south.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from ModelPixelScale and the first ModelTiepoint.
    pub fn from_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
            return None;
        }
        Some(Self {
            origin_x: tiepoint[3] - tiepoint[0] * scale[0],
            origin_y: tiepoint[4] + tiepoint[1] * scale[1],
            pixel_width: scale[0],
            pixel_height: scale[1],
        })
    }

    /// Build from a row-major 4x4 ModelTransformation without rotation.
    pub fn from_matrix(m: &[f64]) -> Option<Self> {
        if m.len() < 16 || m[1] != 0.0 || m[4] != 0.0 || m[0] <= 0.0 || m[5] >= 0.0 {
            return None;
        }
        Some(Self {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: -m[5],
        })
    }

    /// Same footprint sampled on a coarser grid of `width` x `height`.
    pub fn rescaled(&self, full: (u32, u32), level: (u32, u32)) -> Self {
        Self {
            origin_x: self.origin_x,
            origin_y: self.origin_y,
            pixel_width: self.pixel_width * full.0 as f64 / level.0 as f64,
            pixel_height: self.pixel_height * full.1 as f64 / level.1 as f64,
        }
    }

    /// Shift by half a pixel for PixelIsPoint rasters.
    fn to_pixel_is_area(self) -> Self {
        Self {
            origin_x: self.origin_x - self.pixel_width / 2.0,
            origin_y: self.origin_y + self.pixel_height / 2.0,
            ..self
        }
    }

    /// Continuous pixel coordinates (column, row) of a CRS point.
    #[inline]
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Extent as (min_x, min_y, max_x, max_y) for a raster of the given size.
    pub fn bounds(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        (
            self.origin_x,
            self.origin_y - height as f64 * self.pixel_height,
            self.origin_x + width as f64 * self.pixel_width,
            self.origin_y,
        )
    }
}

/// Georeferencing of the full-resolution image.
#[derive(Debug, Clone, Copy)]
pub struct GeoInfo {
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
}

/// Raw tag values the GeoTIFF interpretation needs.
#[derive(Debug, Default)]
pub struct GeoTags {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoint: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub key_directory: Option<Vec<u64>>,
    pub gdal_nodata: Option<String>,
}

impl GeoTags {
    pub fn interpret(&self) -> Result<GeoInfo> {
        let keys = self.key_directory.as_deref().map(parse_key_directory).unwrap_or_default();
        let key = |id: u16| keys.iter().find(|(k, _)| *k == id).map(|(_, v)| *v);

        let mut transform = match (&self.pixel_scale, &self.tiepoint, &self.transformation) {
            (Some(scale), Some(tie), _) => GeoTransform::from_tiepoint(scale, tie),
            (_, _, Some(matrix)) => GeoTransform::from_matrix(matrix),
            _ => None,
        }
        .ok_or_else(|| CogError::invalid("missing or rotated georeferencing"))?;

        if key(keys::GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
            transform = transform.to_pixel_is_area();
        }

        let user_defined = || CogError::UnsupportedCrs("user-defined CRS".into());
        let epsg = match (
            key(keys::GT_MODEL_TYPE),
            key(keys::PROJECTED_CS_TYPE),
            key(keys::GEOGRAPHIC_TYPE),
        ) {
            (_, Some(code), _) if code != USER_DEFINED => code as u32,
            (Some(MODEL_TYPE_PROJECTED), _, _) => return Err(user_defined()),
            (_, _, Some(code)) if code != USER_DEFINED => code as u32,
            (Some(MODEL_TYPE_GEOGRAPHIC), _, None) => 4326,
            (Some(MODEL_TYPE_GEOGRAPHIC), _, _) => return Err(user_defined()),
            _ => return Err(CogError::UnsupportedCrs("no CRS geokeys".into())),
        };
        let crs = Crs::from_epsg(epsg).map_err(|e| CogError::UnsupportedCrs(e.to_string()))?;

        let nodata = self
            .gdal_nodata
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok());

        Ok(GeoInfo {
            transform,
            crs,
            nodata,
        })
    }
}

/// (key id, value) pairs whose value is stored inline in the directory.
fn parse_key_directory(dir: &[u64]) -> Vec<(u16, u16)> {
    if dir.len() < 4 {
        return Vec::new();
    }
    let count = dir[3] as usize;
    dir[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|k| k[1] == 0)
        .map(|k| (k[0] as u16, k[3] as u16))
        .collect()
}
