//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::PI;

/// WGS84 semi-major axis, used as the sphere radius by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude where Web Mercator becomes square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Convert Web Mercator meters to WGS84 lon/lat degrees.
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Convert WGS84 lon/lat degrees to Web Mercator meters.
///
/// Latitude is clamped to the projection's valid range.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}
