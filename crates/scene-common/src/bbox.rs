//! Bounding box types and operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A geographic or projected bounding box.
///
/// For geographic CRS (EPSG:4326), coordinates are in degrees.
/// For projected CRS (EPSG:3857, UTM), coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse a query string bbox: "west,south,east,north"
    pub fn from_query_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            let v: f64 = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
            if !v.is_finite() {
                return Err(BboxParseError::InvalidNumber(part.to_string()));
            }
            *slot = v;
        }

        Self::checked(values[0], values[1], values[2], values[3])
    }

    /// Build a bbox, rejecting inverted corners.
    pub fn checked(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, BboxParseError> {
        if min_x > max_x || min_y > max_y {
            return Err(BboxParseError::Inverted {
                min_x,
                min_y,
                max_x,
                max_y,
            });
        }
        Ok(Self::new(min_x, min_y, max_x, max_y))
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// GeoJSON polygon covering this box, counter-clockwise and closed.
    pub fn to_geojson_polygon(&self) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [self.max_x, self.min_y],
                [self.max_x, self.max_y],
                [self.min_x, self.max_y],
                [self.min_x, self.min_y],
                [self.max_x, self.min_y],
            ]]
        })
    }

    /// Generate a cache key fragment for this bbox (quantized to avoid floating point issues).
    pub fn cache_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Inverted bbox: ({min_x}, {min_y}, {max_x}, {max_y})")]
    Inverted {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_bbox() {
        let bbox = BoundingBox::from_query_string("11.2,46.1,11.6,46.4").unwrap();
        assert_eq!(bbox.min_x, 11.2);
        assert_eq!(bbox.min_y, 46.1);
        assert_eq!(bbox.max_x, 11.6);
        assert_eq!(bbox.max_y, 46.4);
    }

    #[test]
    fn test_geojson_ring_is_closed() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 2.0);
        let poly = bbox.to_geojson_polygon();
        let ring = poly["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert_eq!(poly["type"], "Polygon");
    }
}
