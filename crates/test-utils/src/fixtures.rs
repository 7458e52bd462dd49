//! Common fixtures: test locations and STAC responses.

use serde_json::{json, Value};

/// Named test locations as (lon, lat).
pub mod location {
    /// Trento, Italy (Sentinel-2 tile 32TPS, UTM zone 32N)
    pub const TRENTO: (f64, f64) = (11.12, 46.07);

    /// Madrid, Spain (UTM zone 30N)
    pub const MADRID: (f64, f64) = (-3.70, 40.42);

    /// Buenos Aires, Argentina (UTM zone 21S)
    pub const BUENOS_AIRES: (f64, f64) = (-58.38, -34.60);
}

/// A STAC item with the given id, cloud cover and `band -> href` assets.
pub fn stac_item(id: &str, cloud_cover: f64, assets: &[(&str, &str)]) -> Value {
    let assets: serde_json::Map<String, Value> = assets
        .iter()
        .map(|(band, href)| {
            (
                band.to_string(),
                json!({
                    "href": href,
                    "type": "image/tiff; application=geotiff; profile=cloud-optimized",
                    "roles": ["data"]
                }),
            )
        })
        .collect();

    json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "id": id,
        "collection": "sentinel-2-l2a",
        "bbox": [10.0, 45.0, 12.0, 47.0],
        "geometry": null,
        "properties": {
            "datetime": "2024-06-10T10:15:59.024000Z",
            "eo:cloud_cover": cloud_cover
        },
        "assets": assets,
        "links": []
    })
}

/// A FeatureCollection wrapping `items` in ranking order.
pub fn stac_collection(items: Vec<Value>) -> Value {
    let n = items.len();
    json!({
        "type": "FeatureCollection",
        "features": items,
        "numberReturned": n,
        "context": { "returned": n, "limit": n }
    })
}
