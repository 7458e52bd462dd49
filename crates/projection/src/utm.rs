//! Universal Transverse Mercator on the WGS84 ellipsoid.
//!
//! Forward projection only, following Snyder (1987), USGS Professional
//! Paper 1395, pp. 61-64. Sentinel-2 L2A assets are delivered in UTM zones
//! (EPSG 326xx north, 327xx south).

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone and hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utm {
    pub zone: u32,
    pub north: bool,
}

impl Utm {
    /// Parse EPSG 326xx (north) or 327xx (south).
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        if (32601..=32660).contains(&epsg) {
            Some(Self {
                zone: epsg - 32600,
                north: true,
            })
        } else if (32701..=32760).contains(&epsg) {
            Some(Self {
                zone: epsg - 32700,
                north: false,
            })
        } else {
            None
        }
    }

    pub fn epsg(&self) -> u32 {
        if self.north {
            32600 + self.zone
        } else {
            32700 + self.zone
        }
    }

    /// Central meridian of the zone in degrees.
    pub fn central_meridian(&self) -> f64 {
        (self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Project WGS84 lon/lat (degrees) to (easting, northing) meters.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();
        let lon0 = self.central_meridian().to_radians();

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = E_PRIME2 * cos_lat * cos_lat;
        let a = cos_lat * (lon - lon0);
        let m = meridional_arc(lat);

        let a2 = a * a;
        let a4 = a2 * a2;
        let a6 = a4 * a2;

        let easting = K0
            * n
            * (a + (1.0 - t + c) * a2 * a / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
            + FALSE_EASTING;

        let northing = K0
            * (m + n
                * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

        if self.north {
            (easting, northing)
        } else {
            (easting, northing + FALSE_NORTHING_SOUTH)
        }
    }
}

/// Meridional arc from the equator to `lat` (radians), Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    #[test]
    fn test_parse_epsg() {
        assert_eq!(Utm::from_epsg(32632), Some(Utm { zone: 32, north: true }));
        assert_eq!(Utm::from_epsg(32721), Some(Utm { zone: 21, north: false }));
        assert_eq!(Utm::from_epsg(32600), None);
        assert_eq!(Utm::from_epsg(32661), None);
        assert_eq!(Utm::from_epsg(4326), None);
    }

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True).transform(-3.7037, 40.4168)
    #[test]
    fn test_madrid_zone_30n() {
        let (e, n) = Utm { zone: 30, north: true }.forward(-3.7037, 40.4168);
        assert_close(e, 440_298.94, 1.0);
        assert_close(n, 4_474_257.31, 1.0);
    }

    #[test]
    fn test_buenos_aires_zone_21s() {
        let (e, n) = Utm { zone: 21, north: false }.forward(-58.3816, -34.6037);
        assert_close(e, 373_317.50, 1.0);
        assert_close(n, 6_170_036.17, 1.0);
    }

    #[test]
    fn test_central_meridian_on_equator() {
        let (e, n) = Utm { zone: 30, north: true }.forward(-3.0, 0.0);
        assert_close(e, 500_000.0, 0.01);
        assert_close(n, 0.0, 0.01);
    }
}
