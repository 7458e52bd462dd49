//! End-to-end reads of synthetic COGs through every source type.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cog_reader::{
    CogError, CogFetcherOptions, CogReader, CogTileFetcher, MemorySource, RangeSource, TileFetcher,
};
use projection::Utm;
use scene_common::{latlon_to_tile, TileCoord};
use test_utils::{
    create_constant_grid, create_index_grid, create_rgb_grid, location, Compression, GeoTiffBuilder,
    SampleType,
};

// ============================================================================
// Helpers
// ============================================================================

const Z12: TileCoord = TileCoord { z: 12, x: 2200, y: 1500 };

/// 512x512 float COG exactly covering `Z12`, with one 2x overview.
fn mercator_cog() -> Vec<u8> {
    GeoTiffBuilder::new(512, 512)
        .covering_mercator_tile(Z12.z, Z12.x, Z12.y)
        .samples(1, SampleType::F32)
        .overviews(&[2])
        .build(&create_index_grid(512, 512))
}

async fn open_bytes(bytes: Vec<u8>) -> Result<CogReader, CogError> {
    let source: Arc<dyn RangeSource> = Arc::new(MemorySource::new("mem.tif", bytes));
    CogReader::open(source).await
}

/// 10 km square UTM 32N raster centred on Trento at 20 m resolution.
fn utm_builder() -> GeoTiffBuilder {
    let (lon, lat) = location::TRENTO;
    let (e, n) = Utm::from_epsg(32632).unwrap().forward(lon, lat);
    GeoTiffBuilder::new(500, 500)
        .crs(32632, ((e - 5000.0).round(), (n + 5000.0).round()), 20.0)
        .tile_size(128)
}

fn trento_tile() -> TileCoord {
    let (lon, lat) = location::TRENTO;
    latlon_to_tile(lat, lon, 14)
}

// ============================================================================
// Level selection and sampling
// ============================================================================

#[tokio::test]
async fn test_metadata() {
    let reader = open_bytes(mercator_cog()).await.unwrap();
    let meta = reader.metadata();
    assert_eq!((meta.width, meta.height), (512, 512));
    assert_eq!(meta.overviews, 1);
    assert_eq!(meta.epsg, 3857);
    assert_eq!(meta.samples_per_pixel, 1);
    assert_eq!(reader.levels()[1].grid.width, 256);
}

#[tokio::test]
async fn test_tile_at_overview_resolution_reads_overview() {
    let reader = open_bytes(mercator_cog()).await.unwrap();
    assert_eq!(reader.select_level(Z12, 256), 1);

    let tile = reader.read_xyz(Z12, 256).await.unwrap();
    assert_eq!((tile.width, tile.height, tile.channels), (256, 256, 1));
    assert!(tile.valid.iter().all(|v| *v));

    // overview pixel (c, r) is full-resolution pixel (2c, 2r)
    let at = |c: usize, r: usize| tile.data[r * 256 + c];
    assert_eq!(at(0, 0), 0.0);
    assert_eq!(at(10, 3), (20 + 6 * 1000) as f32);
    assert_eq!(at(255, 255), (510 + 510 * 1000) as f32);
}

#[tokio::test]
async fn test_child_tile_reads_full_resolution() {
    let reader = open_bytes(mercator_cog()).await.unwrap();
    let child = TileCoord::new(13, Z12.x * 2, Z12.y * 2);
    assert_eq!(reader.select_level(child, 256), 0);

    let tile = reader.read_xyz(child, 256).await.unwrap();
    let at = |c: usize, r: usize| tile.data[r * 256 + c];
    assert_eq!(at(0, 0), 0.0);
    assert_eq!(at(7, 100), (7 + 100 * 1000) as f32);
    assert_eq!(at(255, 255), (255 + 255 * 1000) as f32);
}

#[tokio::test]
async fn test_coarse_request_falls_back_to_coarsest_fitting_level() {
    let reader = open_bytes(mercator_cog()).await.unwrap();
    // Output pixels four times larger than full resolution: overview is the
    // coarsest level not coarser than that.
    assert_eq!(reader.select_level(Z12, 128), 1);
    // Output finer than full resolution still reads full resolution.
    assert_eq!(reader.select_level(TileCoord::new(16, Z12.x * 16, Z12.y * 16), 256), 0);
}

#[tokio::test]
async fn test_tile_outside_extent() {
    let reader = open_bytes(mercator_cog()).await.unwrap();
    let err = reader.read_xyz(TileCoord::new(12, 0, 0), 256).await.unwrap_err();
    assert!(matches!(err, CogError::TileOutsideBounds { z: 12, x: 0, y: 0, .. }));
}

// ============================================================================
// Encodings
// ============================================================================

#[tokio::test]
async fn test_utm_deflate_predictor() {
    let bytes = utm_builder()
        .compression(Compression::Deflate)
        .predictor(true)
        .build(&create_constant_grid(500, 500, 1234.0));
    let reader = open_bytes(bytes).await.unwrap();
    assert_eq!(reader.metadata().epsg, 32632);

    let tile = reader.read_xyz(trento_tile(), 256).await.unwrap();
    assert!(tile.valid.iter().all(|v| *v));
    assert!(tile.data.iter().all(|v| *v == 1234.0));
}

#[tokio::test]
async fn test_utm_tile_far_away_is_outside() {
    let bytes = utm_builder().build(&create_constant_grid(500, 500, 1.0));
    let reader = open_bytes(bytes).await.unwrap();
    let (lon, _) = location::TRENTO;
    let far = latlon_to_tile(40.0, lon, 14);
    assert!(matches!(
        reader.read_xyz(far, 256).await,
        Err(CogError::TileOutsideBounds { .. })
    ));
}

#[tokio::test]
async fn test_nodata_is_masked() {
    let bytes = utm_builder()
        .nodata(0.0)
        .build(&create_constant_grid(500, 500, 0.0));
    let reader = open_bytes(bytes).await.unwrap();
    assert_eq!(reader.metadata().nodata, Some(0.0));

    let tile = reader.read_xyz(trento_tile(), 64).await.unwrap();
    assert!(tile.valid.iter().all(|v| !*v));
}

#[tokio::test]
async fn test_big_endian_lzw_rgb() {
    let bytes = GeoTiffBuilder::new(256, 256)
        .covering_mercator_tile(Z12.z, Z12.x, Z12.y)
        .samples(3, SampleType::U8)
        .compression(Compression::Lzw)
        .predictor(true)
        .big_endian(true)
        .build(&create_rgb_grid(256, 256));
    let reader = open_bytes(bytes).await.unwrap();

    let tile = reader.read_xyz(Z12, 256).await.unwrap();
    assert_eq!(tile.channels, 3);
    let n = 256 * 256;
    let px = 40 * 256 + 17;
    assert_eq!(tile.data[px], 17.0);
    assert_eq!(tile.data[n + px], 40.0);
    assert_eq!(tile.data[2 * n + px], 128.0);
}

#[tokio::test]
async fn test_uncompressed_u16() {
    let bytes = GeoTiffBuilder::new(256, 256)
        .covering_mercator_tile(Z12.z, Z12.x, Z12.y)
        .compression(Compression::None)
        .build(&create_constant_grid(256, 256, 4242.0));
    let tile = open_bytes(bytes).await.unwrap().read_xyz(Z12, 256).await.unwrap();
    assert!(tile.data.iter().all(|v| *v == 4242.0));
}

// ============================================================================
// Failure modes
// ============================================================================

#[tokio::test]
async fn test_not_a_tiff() {
    let err = open_bytes(b"<html>not found</html>".to_vec()).await.unwrap_err();
    assert!(matches!(err, CogError::InvalidTiff(_)));
}

#[tokio::test]
async fn test_unsupported_crs() {
    let bytes = GeoTiffBuilder::new(64, 64)
        .tile_size(64)
        .crs(2154, (700000.0, 6600000.0), 10.0)
        .build(&create_constant_grid(64, 64, 1.0));
    assert!(matches!(open_bytes(bytes).await, Err(CogError::UnsupportedCrs(_))));
}

/// Rewrites the first IFD's entry for `tag` as a LONG8 holding `value`,
/// stored out of line at the end of a little-endian classic TIFF.
fn patch_long8(bytes: &mut Vec<u8>, tag: u16, value: u64) {
    let ifd = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let count = u16::from_le_bytes([bytes[ifd], bytes[ifd + 1]]) as usize;
    let entry = (0..count)
        .map(|i| ifd + 2 + 12 * i)
        .find(|&at| u16::from_le_bytes([bytes[at], bytes[at + 1]]) == tag)
        .expect("tag not in first IFD");
    let value_at = bytes.len() as u32;
    bytes[entry + 2..entry + 4].copy_from_slice(&16u16.to_le_bytes());
    bytes[entry + 4..entry + 8].copy_from_slice(&1u32.to_le_bytes());
    bytes[entry + 8..entry + 12].copy_from_slice(&value_at.to_le_bytes());
    bytes.extend_from_slice(&value.to_le_bytes());
}

#[tokio::test]
async fn test_oversized_tile_size_rejected() {
    let tiff = GeoTiffBuilder::new(64, 64)
        .tile_size(64)
        .build(&create_constant_grid(64, 64, 1.0));

    // 2^32 would wrap to 0 and 2^32 + 64 to 64
    for value in [1u64 << 32, (1u64 << 32) + 64] {
        let mut bytes = tiff.clone();
        patch_long8(&mut bytes, 322, value);
        let err = open_bytes(bytes).await.unwrap_err();
        assert!(matches!(err, CogError::InvalidTiff(_)), "{err:?}");
    }

    let mut bytes = tiff.clone();
    patch_long8(&mut bytes, 256, 1u64 << 32);
    assert!(matches!(open_bytes(bytes).await, Err(CogError::InvalidTiff(_))));
}

#[tokio::test]
async fn test_truncated_tile_data() {
    let mut bytes = mercator_cog();
    bytes.truncate(bytes.len() - 100);
    let reader = open_bytes(bytes).await.unwrap();
    // the last internal tile of the overview sits at the end of the file
    assert!(reader.read_xyz(Z12, 256).await.is_err());
}

// ============================================================================
// Fetcher over file and HTTP
// ============================================================================

#[tokio::test]
async fn test_fetcher_file_paths_and_header_cache() {
    let dir = test_utils::temp_test_dir();
    let path = GeoTiffBuilder::new(512, 512)
        .covering_mercator_tile(Z12.z, Z12.x, Z12.y)
        .overviews(&[2])
        .write_to(&create_constant_grid(512, 512, 7.0), dir.path(), "band.tif");

    let fetcher = CogTileFetcher::new(CogFetcherOptions::default()).unwrap();
    let href = path.to_str().unwrap().to_string();

    let tile = fetcher.fetch_tile(&href, Z12).await.unwrap();
    assert_eq!(tile.width, 256);
    assert!(tile.data.iter().all(|v| *v == 7.0));

    fetcher
        .fetch_tile(&href, TileCoord::new(13, Z12.x * 2 + 1, Z12.y * 2))
        .await
        .unwrap();
    assert_eq!(fetcher.cached_headers(), 1);

    let url = format!("file://{href}");
    assert!(fetcher.fetch_tile(&url, Z12).await.is_ok());
    assert_eq!(fetcher.cached_headers(), 2);
}

#[tokio::test]
async fn test_fetcher_missing_file() {
    let fetcher = CogTileFetcher::new(CogFetcherOptions::default()).unwrap();
    let err = fetcher.fetch_tile("/nope/B04.tif", Z12).await.unwrap_err();
    assert!(matches!(err, CogError::Io { .. }));
}

async fn serve_ranges(State(data): State<Arc<Vec<u8>>>, headers: HeaderMap) -> Response {
    let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::OK, data.to_vec()).into_response();
    };
    let (a, b) = range.trim_start_matches("bytes=").split_once('-').unwrap();
    let start: usize = a.parse().unwrap();
    if start >= data.len() {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    let end = b.parse::<usize>().unwrap().min(data.len() - 1);
    (StatusCode::PARTIAL_CONTENT, data[start..=end].to_vec()).into_response()
}

#[tokio::test]
async fn test_fetcher_over_http_ranges() {
    let data = Arc::new(mercator_cog());
    let app = Router::new()
        .route("/cogs/B04.tif", get(serve_ranges))
        .with_state(data);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let fetcher = CogTileFetcher::new(CogFetcherOptions::default()).unwrap();
    let tile = fetcher
        .fetch_tile(&format!("http://{addr}/cogs/B04.tif"), Z12)
        .await
        .unwrap();
    assert_eq!(tile.data[3 * 256 + 10], (20 + 6 * 1000) as f32);

    let err = fetcher
        .fetch_tile(&format!("http://{addr}/cogs/missing.tif"), Z12)
        .await
        .unwrap_err();
    assert!(matches!(err, CogError::Http { status: 404, .. }));
}
