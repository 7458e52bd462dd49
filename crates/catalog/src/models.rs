//! STAC request and response types.
//!
//! Only the subset the tile pipeline reads is modelled; the raw response is
//! kept alongside so `/search` can hand it back untouched.

use scene_common::{BoundingBox, TimeWindow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// A scene search: footprint, dates, cloud ceiling and page size.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub bbox: BoundingBox,
    pub window: TimeWindow,
    /// Scenes must have `eo:cloud_cover` strictly below this percentage.
    pub cloud_cover_max: u32,
    pub limit: u32,
}

impl SceneQuery {
    pub fn new(bbox: BoundingBox, window: TimeWindow, cloud_cover_max: u32, limit: u32) -> Self {
        Self {
            bbox,
            window,
            cloud_cover_max,
            limit,
        }
    }

    /// STAC Item Search body for `collection`.
    pub fn to_search_body(&self, collection: &str) -> Value {
        json!({
            "collections": [collection],
            "datetime": self.window.stac_interval(),
            "query": { "eo:cloud_cover": { "lt": self.cloud_cover_max } },
            "intersects": self.bbox.to_geojson_polygon(),
            "limit": self.limit,
        })
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One downloadable file of a scene.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SceneAsset {
    pub href: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct StacItem {
    id: String,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
    #[serde(default)]
    collection: Option<String>,
    properties: StacProperties,
    #[serde(default)]
    assets: HashMap<String, SceneAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct StacProperties {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover", default)]
    cloud_cover: Option<f64>,
}

/// The parts of a STAC item the tile pipeline needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMetadata {
    pub id: String,
    /// Acquisition timestamp as published by the catalog.
    pub datetime: Option<String>,
    /// Cloud cover percentage.
    pub cloud_cover: Option<f64>,
    pub bbox: Option<Vec<f64>>,
    pub collection: Option<String>,
    pub assets: HashMap<String, SceneAsset>,
}

impl SceneMetadata {
    /// Parse one GeoJSON feature of a search response.
    pub fn from_feature(feature: &Value) -> Result<Self, serde_json::Error> {
        let item = StacItem::deserialize(feature)?;
        Ok(Self {
            id: item.id,
            datetime: item.properties.datetime,
            cloud_cover: item.properties.cloud_cover,
            bbox: item.bbox,
            collection: item.collection,
            assets: item.assets,
        })
    }

    pub fn asset_href(&self, band: &str) -> Option<&str> {
        self.assets.get(band).map(|a| a.href.as_str())
    }
}

/// A search result: the raw catalog JSON plus the parsed scenes in the
/// order the catalog ranked them.
#[derive(Debug, Clone)]
pub struct CatalogResponse {
    pub raw: Value,
    pub scenes: Vec<SceneMetadata>,
}

impl CatalogResponse {
    /// Parse a FeatureCollection body.
    pub fn from_json(raw: Value) -> Result<Self, crate::CatalogError> {
        let features = raw
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| crate::CatalogError::Malformed("missing 'features' array".into()))?;

        let scenes = features
            .iter()
            .map(SceneMetadata::from_feature)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| crate::CatalogError::Malformed(e.to_string()))?;

        Ok(Self { raw, scenes })
    }

    pub fn empty() -> Self {
        Self {
            raw: json!({ "type": "FeatureCollection", "features": [] }),
            scenes: Vec::new(),
        }
    }

    /// The top-ranked scene, if any.
    pub fn first(&self) -> Option<&SceneMetadata> {
        self.scenes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn feature() -> Value {
        json!({
            "type": "Feature",
            "id": "S2B_32TPS_20240610_0_L2A",
            "collection": "sentinel-2-l2a",
            "bbox": [11.0, 46.0, 12.4, 47.0],
            "geometry": null,
            "properties": {
                "datetime": "2024-06-10T10:15:59.024000Z",
                "eo:cloud_cover": 3.25,
                "platform": "sentinel-2b"
            },
            "assets": {
                "red": { "href": "https://example.com/B04.tif", "type": "image/tiff; application=geotiff; profile=cloud-optimized", "roles": ["data"] },
                "visual": { "href": "https://example.com/TCI.tif", "title": "True color image" }
            },
            "links": []
        })
    }

    #[test]
    fn test_search_body() {
        let query = SceneQuery::new(
            BoundingBox::new(11.0, 46.0, 11.5, 46.5),
            TimeWindow::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            ),
            30,
            1,
        );
        let body = query.to_search_body("sentinel-2-l2a");
        assert_eq!(body["collections"], json!(["sentinel-2-l2a"]));
        assert_eq!(body["datetime"], "2024-01-01T00:00:00Z/2024-06-30T23:59:59Z");
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 30);
        assert_eq!(body["intersects"]["type"], "Polygon");
        assert_eq!(body["limit"], 1);
    }

    #[test]
    fn test_parse_feature() {
        let scene = SceneMetadata::from_feature(&feature()).unwrap();
        assert_eq!(scene.id, "S2B_32TPS_20240610_0_L2A");
        assert_eq!(scene.datetime.as_deref(), Some("2024-06-10T10:15:59.024000Z"));
        assert_eq!(scene.cloud_cover, Some(3.25));
        assert_eq!(scene.asset_href("red"), Some("https://example.com/B04.tif"));
        assert_eq!(scene.asset_href("nir"), None);
    }

    #[test]
    fn test_parse_collection_keeps_raw() {
        let raw = json!({ "type": "FeatureCollection", "features": [feature()], "numberReturned": 1 });
        let resp = CatalogResponse::from_json(raw.clone()).unwrap();
        assert_eq!(resp.scenes.len(), 1);
        assert_eq!(resp.raw, raw);
    }

    #[test]
    fn test_empty_collection() {
        let resp = CatalogResponse::from_json(json!({ "type": "FeatureCollection", "features": [] })).unwrap();
        assert!(resp.is_empty());
        assert!(resp.first().is_none());
    }

    #[test]
    fn test_missing_features_is_malformed() {
        assert!(CatalogResponse::from_json(json!({ "code": "oops" })).is_err());
    }
}
