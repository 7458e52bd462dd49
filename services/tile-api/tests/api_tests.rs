//! Router-level tests driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::*;
use tile_api::create_router;

// ============================================================================
// Helpers
// ============================================================================

/// Inside the default zoom range, over Trento.
const TILE: &str = "/tile/12/2174/1459";

fn router(app: &TestApp) -> Router {
    create_router(app.state.clone())
}

async fn send(app: &TestApp, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router(app)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(app, "GET", uri).await
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn decode_png(body: &[u8]) -> image::RgbImage {
    image::load_from_memory_with_format(body, image::ImageFormat::Png)
        .unwrap()
        .to_rgb8()
}

fn standard_app() -> TestApp {
    test_app(
        FakeCatalog::with_items(vec![scene()]),
        FakeFetcher::new(vec![
            (RED_HREF, constant_band(16, 0.1)),
            (NIR_HREF, constant_band(16, 0.5)),
            (VISUAL_HREF, constant_rgb(16, [10.0, 200.0, 30.0])),
        ]),
    )
}

// ============================================================================
// Tile validation
// ============================================================================

#[tokio::test]
async fn test_zoom_out_of_range_rejected_before_catalog() {
    let app = standard_app();
    for z in [9, 17] {
        let (status, _, body) = get(&app, &format!("/tile/{z}/0/0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "Zoom level must be between 10 and 16");
    }
    assert_eq!(app.catalog.calls(), 0);
    assert_eq!(app.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_tile_outside_matrix_rejected() {
    let app = standard_app();
    let (status, _, _) = get(&app, "/tile/10/1024/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.catalog.calls(), 0);
}

#[tokio::test]
async fn test_empty_band1_rejected() {
    let app = standard_app();
    let (status, _, body) = get(&app, &format!("{TILE}?band1=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Band1 is required");
    assert_eq!(app.catalog.calls(), 0);
}

#[tokio::test]
async fn test_code_in_formula_rejected() {
    let app = standard_app();
    let (status, _, body) = get(
        &app,
        &format!("{TILE}?band1=red&formula=__import__(%27os%27).system(%27ls%27)"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().starts_with("Invalid formula"));
    assert_eq!(app.catalog.calls(), 0);
}

#[tokio::test]
async fn test_band2_formula_without_band2_rejected() {
    let app = standard_app();
    let (status, _, _) = get(&app, &format!("{TILE}?band1=red&formula=band2-band1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.catalog.calls(), 0);
}

#[tokio::test]
async fn test_band2_formula_rejected_even_for_visual_band1() {
    // band1 defaults to the 3-channel visual asset, which would be passed
    // through; the formula is still checked up front
    let app = standard_app();
    for uri in [
        format!("{TILE}?formula=band2"),
        format!("{TILE}?band1=visual&formula=(band2-band1)/(band2%2Bband1)"),
    ] {
        let (status, _, body) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            json(&body)["error"],
            "Formula references band2 but no band2 was given"
        );
    }
    assert_eq!(app.catalog.calls(), 0);
    assert_eq!(app.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_non_numeric_cloud_cover_is_json_error() {
    let app = standard_app();
    let (status, _, body) = get(&app, &format!("{TILE}?cloud_cover=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_bad_date_rejected() {
    let app = standard_app();
    let (status, _, _) = get(&app, &format!("{TILE}?start_date=2024/01/01")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.catalog.calls(), 0);
}

// ============================================================================
// Tile rendering
// ============================================================================

#[tokio::test]
async fn test_visual_tile_passthrough() {
    let app = standard_app();
    let (status, headers, body) = get(&app, TILE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["x-image-date"], "2024-06-10T10:15:59.024000Z");
    assert_eq!(headers["x-cloud-cover"], "12.5");
    let secs: f64 = headers["x-computation-time"].to_str().unwrap().parse().unwrap();
    assert!(secs >= 0.0);

    let img = decode_png(&body);
    assert_eq!(img.dimensions(), (16, 16));
    assert_eq!(img.get_pixel(3, 7).0, [10, 200, 30]);

    let query = app.catalog.last_query.lock().clone().unwrap();
    assert_eq!(query.limit, 1);
    assert_eq!(query.cloud_cover_max, 30);
}

#[tokio::test]
async fn test_ndvi_tile() {
    let app = standard_app();
    let (status, _, body) = get(
        &app,
        &format!("{TILE}?band1=red&band2=nir&formula=(band2-band1)/(band2%2Bband1)&cloud_cover=15"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.fetcher.calls(), 2);

    // constant NDVI: every pixel is the ramp midpoint
    let mid = renderer::ColorRamp::rdylgn().color_at(0.5);
    let img = decode_png(&body);
    assert!(img.pixels().all(|p| p.0 == [mid.r, mid.g, mid.b]));
    assert_eq!(app.catalog.last_query.lock().as_ref().unwrap().cloud_cover_max, 15);
}

#[tokio::test]
async fn test_zero_over_zero_masks_every_pixel() {
    let app = test_app(
        FakeCatalog::with_items(vec![scene()]),
        FakeFetcher::new(vec![(RED_HREF, constant_band(16, 0.0))]),
    );
    let (status, _, body) = get(
        &app,
        &format!("{TILE}?band1=red&band2=red&formula=(band2-band1)/(band2%2Bband1)"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(decode_png(&body).pixels().all(|p| p.0 == [0, 0, 0]));
}

#[tokio::test]
async fn test_second_identical_request_served_from_cache() {
    let app = standard_app();
    let uri = format!("{TILE}?band1=red&band2=nir&formula=band2/band1");

    let (s1, h1, first) = get(&app, &uri).await;
    let (s2, h2, second) = get(&app, &uri).await;

    assert_eq!((s1, s2), (StatusCode::OK, StatusCode::OK));
    assert_eq!(first, second);
    assert_eq!(h1["x-cache"], "MISS");
    assert_eq!(h2["x-cache"], "HIT");
    assert_eq!(h2["x-image-date"], h1["x-image-date"]);
    assert_eq!(app.catalog.calls(), 1);
    assert_eq!(app.fetcher.calls(), 2);

    // a different formula is a different tile
    get(&app, &format!("{TILE}?band1=red&band2=nir&formula=band1/band2")).await;
    assert_eq!(app.catalog.calls(), 2);
}

#[tokio::test]
async fn test_no_scene_is_404() {
    let app = test_app(FakeCatalog::with_items(vec![]), FakeFetcher::new(vec![]));
    let (status, _, body) = get(&app, TILE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "No images found for the given parameters");
    assert_eq!(app.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_catalog_failure_is_500() {
    let app = test_app(FakeCatalog::failing(502), FakeFetcher::new(vec![]));
    let (status, _, body) = get(&app, TILE).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("502"));
}

#[tokio::test]
async fn test_fetch_failure_is_500_and_not_cached() {
    let app = test_app(FakeCatalog::with_items(vec![scene()]), FakeFetcher::new(vec![]));
    let (status, _, body) = get(&app, TILE).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("TCI.tif"));

    get(&app, TILE).await;
    assert_eq!(app.catalog.calls(), 2);
}

#[tokio::test]
async fn test_scene_without_band_is_400() {
    let app = standard_app();
    let (status, _, body) = get(&app, &format!("{TILE}?band1=swir16")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("swir16"));
    assert_eq!(app.fetcher.calls(), 0);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_returns_raw_catalog_response() {
    let app = standard_app();
    let (status, _, body) = get(&app, "/search?bbox=11.0,46.0,11.2,46.2&cloud_cover=20").await;
    assert_eq!(status, StatusCode::OK);

    let body = json(&body);
    assert_eq!(body["type"], "FeatureCollection");
    assert_eq!(body["features"][0]["id"], "S2A_32TPS_20240610_0_L2A");

    let query = app.catalog.last_query.lock().clone().unwrap();
    assert_eq!(query.limit, 100);
    assert_eq!(query.cloud_cover_max, 20);
    assert_eq!((query.window.end - query.window.start).num_days(), 60);
}

#[tokio::test]
async fn test_search_empty_result_is_ok() {
    let app = test_app(FakeCatalog::with_items(vec![]), FakeFetcher::new(vec![]));
    let (status, _, body) = get(&app, "/search?bbox=0,0,1,1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["features"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_search_bad_bbox() {
    let app = standard_app();
    for uri in ["/search", "/search?bbox=1,2,3", "/search?bbox=a,b,c,d"] {
        let (status, _, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json(&body)["error"].is_string());
    }
    assert_eq!(app.catalog.calls(), 0);
}

#[tokio::test]
async fn test_search_catalog_failure() {
    let app = test_app(FakeCatalog::failing(503), FakeFetcher::new(vec![]));
    let (status, _, body) = get(&app, "/search?bbox=0,0,1,1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap()
        .starts_with("Error searching STAC API"));
}

// ============================================================================
// Compute
// ============================================================================

#[tokio::test]
async fn test_compute_starts_job() {
    let app = standard_app();
    let (status, _, body) = send(
        &app,
        "POST",
        "/compute?min_x=11.0&min_y=46.0&max_x=11.2&max_y=46.1&operation=median",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["message"], "Processing started");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, _, body) = get(&app, &format!("/compute/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["request"]["operation"], "median");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let requests = app.engine.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].band1, "red");
    assert_eq!(requests[0].band2, "nir");
    assert_eq!(requests[0].formula, "(band2 - band1) / (band2 + band1)");
    assert_eq!(requests[0].output_dir, "output");

    let (_, _, body) = get(&app, "/compute/jobs").await;
    assert_eq!(json(&body)["recent"][0]["state"], "completed");
}

#[tokio::test]
async fn test_compute_requires_bbox() {
    let app = standard_app();
    let (status, _, body) = send(&app, "POST", "/compute?min_x=1&min_y=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
    assert!(app.state.jobs.list().active.is_empty());
}

#[tokio::test]
async fn test_compute_rejects_bad_formula() {
    let app = standard_app();
    let (status, _, _) = send(
        &app,
        "POST",
        "/compute?min_x=0&min_y=0&max_x=1&max_y=1&formula=band3*2",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job() {
    let app = standard_app();
    let id = uuid::Uuid::new_v4();
    let (status, _, _) = get(&app, &format!("/compute/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, "DELETE", &format!("/compute/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(&app, "/compute/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Bands, health, stats
// ============================================================================

#[tokio::test]
async fn test_band_titles() {
    let app = standard_app();
    let (status, _, body) = get(&app, "/sentinel2-bands").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["nir"], "NIR 1 (band 8) - 10m");
}

#[tokio::test]
async fn test_single_band() {
    let app = standard_app();
    let (status, _, body) = get(&app, "/sentinel2-bands?band=nir").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["title"], "NIR 1 (band 8) - 10m");
    assert_eq!(body["gsd"], 10);
    assert!(body.get("roles").is_none());

    let (status, _, body) = get(&app, "/sentinel2-bands?band=B99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "Band not found");
}

#[tokio::test]
async fn test_band_query_error_is_json() {
    let app = standard_app();
    let (status, _, body) = get(&app, "/sentinel2-bands?band=red&band=nir").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("duplicate field"));
}

#[tokio::test]
async fn test_health_and_cache_stats() {
    let app = standard_app();
    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");

    get(&app, TILE).await;
    get(&app, TILE).await;
    let (status, _, body) = get(&app, "/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats = json(&body);
    assert_eq!(stats["entry_count"], 1);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["ttl_secs"], 3600);

    let (_, _, body) = get(&app, "/api/metrics").await;
    assert_eq!(json(&body)["tile_requests"], 2);
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let app = standard_app();
    let (status, _, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
