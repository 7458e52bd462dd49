//! Static spectral band metadata.
//!
//! Loaded once at startup, either from `BANDS_FILE` or from the Sentinel-2
//! L2A asset table compiled into the binary.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::path::Path;

const SENTINEL2_BANDS: &str = include_str!("../data/sentinel-2-bands.json");

/// Fields returned when a single band is requested.
const BAND_FIELDS: [&str; 5] = ["type", "title", "eo:bands", "gsd", "raster:bands"];

/// Band name to STAC asset description.
#[derive(Debug, Clone)]
pub struct BandCatalog {
    bands: Map<String, Value>,
}

impl BandCatalog {
    pub fn sentinel2() -> Result<Self> {
        Self::from_json(SENTINEL2_BANDS).context("Embedded Sentinel-2 band table is invalid")
    }

    /// Load from `path`, or the embedded table when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read band metadata: {:?}", path))?;
                Self::from_json(&text)
                    .with_context(|| format!("Failed to parse band metadata: {:?}", path))
            }
            None => Self::sentinel2(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(bands) => Ok(Self { bands }),
            _ => anyhow::bail!("band metadata must be a JSON object keyed by band name"),
        }
    }

    /// Map of band name to title.
    pub fn titles(&self) -> Value {
        let titles: Map<String, Value> = self
            .bands
            .iter()
            .map(|(name, record)| (name.clone(), record.get("title").cloned().unwrap_or(Value::Null)))
            .collect();
        Value::Object(titles)
    }

    /// Selected fields of one band, or `None` if unknown. Missing fields
    /// are reported as `null`.
    pub fn band(&self, name: &str) -> Option<Value> {
        let record = self.bands.get(name)?;
        let mut out = Map::new();
        for field in BAND_FIELDS {
            out.insert(field.to_string(), record.get(field).cloned().unwrap_or(json!(null)));
        }
        Some(Value::Object(out))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}
