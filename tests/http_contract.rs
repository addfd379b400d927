//! End-to-end checks of the HTTP wire contract.
//!
//! Each test builds the real router over a temp storage root and drives it
//! with `tower::ServiceExt::oneshot`, so no socket is opened.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, Rgb, RgbImage};
use ims::config::ServiceConfig;
use ims::handler::Services;
use ims::server::{IMMUTABLE_CACHE_CONTROL, X_CACHE, build_router};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let frame = RgbImage::from_fn(width, height, |x, y| {
        if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgb([240, 200, 160])
        } else {
            Rgb([20, 40, 80])
        }
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(frame.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

struct Fixture {
    _storage: TempDir,
    _metadata: TempDir,
    router: axum::Router,
}

fn fixture() -> Fixture {
    let storage = TempDir::new().unwrap();
    let metadata = TempDir::new().unwrap();
    std::fs::write(storage.path().join("cat.jpg"), jpeg(320, 240)).unwrap();
    std::fs::write(
        metadata.path().join("dog.json"),
        r#"{"faces":[{"x":0.25,"y":0.25,"w":0.5,"h":0.5,"confidence":0.9}],"suggestedBlur":false}"#,
    )
    .unwrap();
    std::fs::write(storage.path().join("dog.jpg"), jpeg(320, 240)).unwrap();
    std::fs::write(
        metadata.path().join("cat.json"),
        r#"{"faces":[{"x":0.4,"y":0.3,"w":0.2,"h":0.3,"confidence":0.9}],"suggestedBlur":true}"#,
    )
    .unwrap();

    let mut config = ServiceConfig::default();
    config.storage.root = Some(storage.path().to_path_buf());
    config.metadata.root = Some(metadata.path().to_path_buf());
    let services = Arc::new(Services::from_config(&config));

    Fixture {
        _storage: storage,
        _metadata: metadata,
        router: build_router(services),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// =========================================================================
// Transform endpoint
// =========================================================================

#[tokio::test]
async fn transform_returns_image_with_cache_headers() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(get("/i/cat?w=100&h=100&fit=cover&fmt=jpeg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(headers[header::CACHE_CONTROL], IMMUTABLE_CACHE_CONTROL);
    assert_eq!(headers[X_CACHE], "miss");
    assert!(headers.contains_key(header::ETAG));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 100));
}

#[tokio::test]
async fn repeated_request_is_a_cache_hit_with_same_etag() {
    let fx = fixture();
    let uri = "/i/cat?w=160&fmt=webp&q=70";

    let first = fx.router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(first.headers()[X_CACHE], "miss");
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/webp");
    let etag = first.headers()[header::ETAG].clone();

    let second = fx.router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()[X_CACHE], "hit");
    assert_eq!(second.headers()[header::ETAG], etag);
}

#[tokio::test]
async fn if_none_match_yields_not_modified() {
    let fx = fixture();
    let uri = "/i/cat?w=64";
    let first = fx.router.clone().oneshot(get(uri)).await.unwrap();
    let etag = first.headers()[header::ETAG].clone();

    let request = Request::builder()
        .uri(uri)
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let second = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn private_context_with_ml_metadata_still_renders() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(get("/i/cat?w=200&crop=face&context=private&watermark=user&slug=ana"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =========================================================================
// Error contract
// =========================================================================

#[tokio::test]
async fn invalid_dimension_is_bad_request_with_code() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(get("/i/cat?w=5000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_dimension");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn out_of_range_quality_is_bad_request() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(get("/i/cat?q=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_quality");
}

#[tokio::test]
async fn unknown_format_falls_back_to_jpeg() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(get("/i/cat?w=80&fmt=gif"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn missing_image_is_not_found() {
    let fx = fixture();
    let response = fx.router.clone().oneshot(get("/i/bird?w=100")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "image_not_found");
}

#[tokio::test]
async fn unconfigured_storage_is_service_unavailable() {
    let router = build_router(Arc::new(Services::from_config(&ServiceConfig::default())));
    let response = router.oneshot(get("/i/cat?w=100")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "storage_unavailable");
}

// =========================================================================
// Health and admin
// =========================================================================

#[tokio::test]
async fn healthz_reports_cache_stats() {
    let fx = fixture();
    fx.router.clone().oneshot(get("/i/cat?w=50")).await.unwrap();

    let response = fx.router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"]["entries"], 1);
    assert_eq!(body["cache"]["misses"], 1);
}

#[tokio::test]
async fn blur_policy_can_be_swapped_at_runtime() {
    let fx = fixture();

    let before = json_body(
        fx.router
            .clone()
            .oneshot(get("/admin/blur-policy"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(before["version"], 1);

    let put = Request::builder()
        .method("PUT")
        .uri("/admin/blur-policy")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"version":2,"public_default":"none","private_default":"full","respect_ml_suggestion":false,"disabled":false}"#,
        ))
        .unwrap();
    let response = fx.router.clone().oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = json_body(
        fx.router
            .clone()
            .oneshot(get("/admin/blur-policy"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(after["version"], 2);
    assert_eq!(after["private_default"], "full");
}

#[tokio::test]
async fn policy_swap_reaches_cached_variants() {
    let fx = fixture();
    let uri = "/i/dog?context=public&fmt=webp&q=90";

    let first = fx.router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(first.headers()[X_CACHE], "miss");
    let before = first.into_body().collect().await.unwrap().to_bytes();
    let cached = fx.router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(cached.headers()[X_CACHE], "hit");

    let put = Request::builder()
        .method("PUT")
        .uri("/admin/blur-policy")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"version":3,"respect_ml_suggestion":false}"#))
        .unwrap();
    let response = fx.router.clone().oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = fx.router.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(after.headers()[X_CACHE], "miss");
    let after = after.into_body().collect().await.unwrap().to_bytes();
    assert_ne!(after, before);
}
