//! Core COG reader: open a source, pick a level, read XYZ tiles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use scene_common::{RasterTile, TileCoord};
use tracing::{debug, instrument};

use crate::decompress::{TileLayout, PREDICTOR_NONE};
use crate::error::{CogError, Result};
use crate::extract::{self, LevelGrid};
use crate::geotiff::{GeoInfo, GeoTags, GeoTransform};
use crate::ifd::{self, tags, RawIfd, TagEntry, TiffByteOrder};
use crate::source::RangeSource;

/// Size of the first read; normally covers header, IFDs and geokeys.
pub const HEAD_FETCH_LEN: u64 = 64 * 1024;

/// Upper bound on concurrent range requests for one output tile.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

const MAX_IFDS: usize = 64;

/// NewSubfileType bit marking a transparency mask.
const SUBFILE_MASK: u64 = 4;

/// One resolution level (full resolution or an overview).
#[derive(Debug, Clone)]
pub struct ImageLevel {
    pub grid: LevelGrid,
    pub layout: TileLayout,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
}

/// Summary of an opened COG.
#[derive(Debug, Clone, PartialEq)]
pub struct CogMetadata {
    pub location: String,
    pub width: u32,
    pub height: u32,
    pub overviews: usize,
    pub samples_per_pixel: usize,
    pub epsg: u32,
    pub nodata: Option<f64>,
    /// (min_x, min_y, max_x, max_y) in the source CRS.
    pub bounds: (f64, f64, f64, f64),
}

/// Cloud Optimized GeoTIFF reader.
///
/// Holds the parsed header only; pixel data is fetched per request.
pub struct CogReader {
    source: Arc<dyn RangeSource>,
    levels: Vec<ImageLevel>,
    geo: GeoInfo,
}

impl std::fmt::Debug for CogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CogReader")
            .field("location", &self.source.location())
            .field("levels", &self.levels.len())
            .field("crs", &self.geo.crs.epsg())
            .finish()
    }
}

impl CogReader {
    /// Read and parse the TIFF header and every IFD of `source`.
    #[instrument(skip(source), fields(asset = %source.location()))]
    pub async fn open(source: Arc<dyn RangeSource>) -> Result<Self> {
        let head = source.read_range(0, HEAD_FETCH_LEN).await?;
        let header = ifd::parse_header(&head)?;
        let bo = header.byte_order;
        let bytes = HeaderBytes {
            source: source.as_ref(),
            head,
        };

        let mut raw_ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;
        while offset != 0 {
            if raw_ifds.len() >= MAX_IFDS || !seen.insert(offset) {
                return Err(CogError::invalid("IFD chain does not terminate"));
            }
            let count = bo.u16(&bytes.read(offset, 2).await?);
            let data = bytes.read(offset, ifd::ifd_len(count) as u64).await?;
            let raw = ifd::parse_ifd(bo, &data)?;
            offset = raw.next_ifd_offset;
            raw_ifds.push(raw);
        }

        let first = raw_ifds
            .first()
            .ok_or_else(|| CogError::invalid("no image directories"))?;
        let geo = GeoTags {
            pixel_scale: bytes.f64s(bo, first, tags::MODEL_PIXEL_SCALE).await?,
            tiepoint: bytes.f64s(bo, first, tags::MODEL_TIEPOINT).await?,
            transformation: bytes.f64s(bo, first, tags::MODEL_TRANSFORMATION).await?,
            key_directory: bytes.u64s(bo, first, tags::GEO_KEY_DIRECTORY).await?,
            gdal_nodata: bytes.ascii(bo, first, tags::GDAL_NODATA).await?,
        }
        .interpret()?;

        let mut levels: Vec<ImageLevel> = Vec::new();
        for raw in &raw_ifds {
            let subfile = bytes.first_u64(bo, raw, tags::NEW_SUBFILE_TYPE).await?.unwrap_or(0);
            if subfile & SUBFILE_MASK != 0 {
                continue;
            }
            let mut level = resolve_level(&bytes, bo, raw, geo.transform).await?;
            if let Some(full) = levels.first() {
                level.grid.transform = geo.transform.rescaled(
                    (full.grid.width, full.grid.height),
                    (level.grid.width, level.grid.height),
                );
            }
            levels.push(level);
        }
        if levels.is_empty() {
            return Err(CogError::invalid("no image levels"));
        }

        debug!(
            levels = levels.len(),
            epsg = geo.crs.epsg(),
            width = levels[0].grid.width,
            height = levels[0].grid.height,
            "opened COG"
        );

        Ok(Self { source, levels, geo })
    }

    pub fn location(&self) -> &str {
        self.source.location()
    }

    pub fn levels(&self) -> &[ImageLevel] {
        &self.levels
    }

    pub fn geo(&self) -> &GeoInfo {
        &self.geo
    }

    pub fn metadata(&self) -> CogMetadata {
        let full = &self.levels[0];
        CogMetadata {
            location: self.location().to_string(),
            width: full.grid.width,
            height: full.grid.height,
            overviews: self.levels.len() - 1,
            samples_per_pixel: full.layout.samples_per_pixel,
            epsg: self.geo.crs.epsg(),
            nodata: self.geo.nodata,
            bounds: self.geo.transform.bounds(full.grid.width, full.grid.height),
        }
    }

    /// Source-CRS size of one output pixel when `tile` is rendered at
    /// `size` x `size`, taken over the projected tile corners.
    fn target_resolution(&self, tile: TileCoord, size: usize) -> f64 {
        let b = tile.mercator_bounds();
        let corners = [
            (b.min_x, b.min_y),
            (b.min_x, b.max_y),
            (b.max_x, b.min_y),
            (b.max_x, b.max_y),
        ]
        .map(|(x, y)| self.geo.crs.from_mercator(x, y));

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        ((max_x - min_x) / size as f64).min((max_y - min_y) / size as f64)
    }

    /// Index of the coarsest level whose pixels are no larger than the
    /// output resolution; full resolution when every level is coarser.
    pub fn select_level(&self, tile: TileCoord, size: usize) -> usize {
        let target = self.target_resolution(tile, size) * (1.0 + 1e-9);
        let mut best = 0;
        for (i, level) in self.levels.iter().enumerate() {
            let res = level.grid.resolution();
            if res <= target && res > self.levels[best].grid.resolution() {
                best = i;
            }
        }
        best
    }

    /// Read `tile` resampled to `size` x `size` pixels.
    #[instrument(skip(self), fields(asset = %self.location(), z = tile.z, x = tile.x, y = tile.y))]
    pub async fn read_xyz(&self, tile: TileCoord, size: usize) -> Result<RasterTile> {
        let level_idx = self.select_level(tile, size);
        let level = &self.levels[level_idx];
        let grid = level.grid;
        let crs = self.geo.crs;

        let plan = tokio::task::spawn_blocking(move || extract::plan_samples(&grid, &crs, tile, size)).await?;
        if plan.is_outside() {
            return Err(CogError::TileOutsideBounds {
                z: tile.z,
                x: tile.x,
                y: tile.y,
                asset: self.location().to_string(),
            });
        }

        let source = &self.source;
        let fetched: Vec<(u32, Option<Bytes>)> = stream::iter(plan.tiles.clone())
            .map(|t| {
                let offset = level.tile_offsets.get(t as usize).copied();
                let len = level.tile_byte_counts.get(t as usize).copied();
                async move {
                    match (offset, len) {
                        (Some(offset), Some(len)) if len > 0 => {
                            let data = source.read_range(offset, len).await?;
                            if (data.len() as u64) < len {
                                return Err(CogError::invalid(format!(
                                    "tile {t} truncated: {} of {len} bytes",
                                    data.len()
                                )));
                            }
                            Ok((t, Some(data)))
                        }
                        // sparse tile
                        _ => Ok::<_, CogError>((t, None)),
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .try_collect()
            .await?;

        debug!(level = level_idx, tiles = fetched.len(), "fetched internal tiles");

        let layout = level.layout;
        let nodata = self.geo.nodata;
        tokio::task::spawn_blocking(move || {
            let mut decoded = HashMap::with_capacity(fetched.len());
            for (t, data) in fetched {
                if let Some(data) = data {
                    decoded.insert(t, layout.decode(&data)?);
                }
            }
            Ok(extract::assemble(&plan, &decoded, layout.samples_per_pixel, nodata))
        })
        .await?
    }
}

// ---------------------------------------------------------------------------
// Header byte access
// ---------------------------------------------------------------------------

/// Serves header reads from the initial fetch, falling back to the source.
struct HeaderBytes<'a> {
    source: &'a dyn RangeSource,
    head: Bytes,
}

impl HeaderBytes<'_> {
    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        let end = offset.saturating_add(len);
        if end <= self.head.len() as u64 {
            return Ok(self.head.slice(offset as usize..end as usize));
        }
        let data = self.source.read_range(offset, len).await?;
        if (data.len() as u64) < len {
            return Err(CogError::invalid(format!(
                "truncated header data at offset {offset}"
            )));
        }
        Ok(data)
    }

    async fn value(&self, bo: TiffByteOrder, entry: &TagEntry) -> Result<Bytes> {
        if entry.is_inline() {
            Ok(Bytes::copy_from_slice(&entry.raw[..entry.byte_len() as usize]))
        } else {
            self.read(entry.value_offset(bo), entry.byte_len()).await
        }
    }

    async fn u64s(&self, bo: TiffByteOrder, raw: &RawIfd, tag: u16) -> Result<Option<Vec<u64>>> {
        match raw.entry(tag) {
            Some(entry) => Ok(Some(ifd::decode_u64s(bo, entry, &self.value(bo, entry).await?))),
            None => Ok(None),
        }
    }

    async fn f64s(&self, bo: TiffByteOrder, raw: &RawIfd, tag: u16) -> Result<Option<Vec<f64>>> {
        match raw.entry(tag) {
            Some(entry) => Ok(Some(ifd::decode_f64s(bo, entry, &self.value(bo, entry).await?))),
            None => Ok(None),
        }
    }

    async fn ascii(&self, bo: TiffByteOrder, raw: &RawIfd, tag: u16) -> Result<Option<String>> {
        match raw.entry(tag) {
            Some(entry) => Ok(Some(ifd::decode_ascii(&self.value(bo, entry).await?))),
            None => Ok(None),
        }
    }

    async fn first_u64(&self, bo: TiffByteOrder, raw: &RawIfd, tag: u16) -> Result<Option<u64>> {
        Ok(self.u64s(bo, raw, tag).await?.and_then(|v| v.first().copied()))
    }
}

async fn resolve_level(
    bytes: &HeaderBytes<'_>,
    bo: TiffByteOrder,
    raw: &RawIfd,
    transform: GeoTransform,
) -> Result<ImageLevel> {
    let required = |v: Option<u64>, name: &str| {
        match v {
            Some(v) if v > 0 => {
                u32::try_from(v).map_err(|_| CogError::invalid(format!("{name} {v} out of range")))
            }
            _ => Err(CogError::invalid(format!("missing {name}"))),
        }
    };

    let width = required(bytes.first_u64(bo, raw, tags::IMAGE_WIDTH).await?, "ImageWidth")?;
    let height = required(bytes.first_u64(bo, raw, tags::IMAGE_LENGTH).await?, "ImageLength")?;

    let tile_width = bytes.first_u64(bo, raw, tags::TILE_WIDTH).await?;
    let tile_height = bytes.first_u64(bo, raw, tags::TILE_LENGTH).await?;
    let (tile_width, tile_height) = match (tile_width, tile_height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => match (u32::try_from(w), u32::try_from(h)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(CogError::invalid(format!("tile size {w}x{h} out of range"))),
        },
        _ => return Err(CogError::Unsupported("stripped TIFF, expected tiles".into())),
    };

    let samples_per_pixel = bytes.first_u64(bo, raw, tags::SAMPLES_PER_PIXEL).await?.unwrap_or(1) as usize;
    let planar = bytes.first_u64(bo, raw, tags::PLANAR_CONFIG).await?.unwrap_or(1);
    if samples_per_pixel > 1 && planar != 1 {
        return Err(CogError::Unsupported(format!("planar configuration {planar}")));
    }

    let layout = TileLayout {
        byte_order: bo,
        tile_width: tile_width as usize,
        tile_height: tile_height as usize,
        samples_per_pixel,
        bits_per_sample: bytes.first_u64(bo, raw, tags::BITS_PER_SAMPLE).await?.unwrap_or(1) as u16,
        sample_format: bytes.first_u64(bo, raw, tags::SAMPLE_FORMAT).await?.unwrap_or(1) as u16,
        compression: bytes.first_u64(bo, raw, tags::COMPRESSION).await?.unwrap_or(1) as u16,
        predictor: bytes
            .first_u64(bo, raw, tags::PREDICTOR)
            .await?
            .map(|p| p as u16)
            .unwrap_or(PREDICTOR_NONE),
    };
    layout.check()?;

    let grid = LevelGrid {
        width,
        height,
        tile_width,
        tile_height,
        transform,
    };

    let tile_offsets = bytes.u64s(bo, raw, tags::TILE_OFFSETS).await?.unwrap_or_default();
    let tile_byte_counts = bytes.u64s(bo, raw, tags::TILE_BYTE_COUNTS).await?.unwrap_or_default();
    if tile_offsets.len() != grid.tile_count() || tile_byte_counts.len() != grid.tile_count() {
        return Err(CogError::invalid(format!(
            "expected {} tile offsets, found {} offsets and {} byte counts",
            grid.tile_count(),
            tile_offsets.len(),
            tile_byte_counts.len()
        )));
    }

    Ok(ImageLevel {
        grid,
        layout,
        tile_offsets,
        tile_byte_counts,
    })
}
