//! HTTP transport.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /i/{image_id}?…` | Transform endpoint (the wire contract) |
//! | `GET /healthz` | Liveness plus cache statistics and build revision |
//! | `GET /admin/blur-policy` | Current blur policy snapshot |
//! | `PUT /admin/blur-policy` | Atomically replace the blur policy |
//!
//! Successful transforms carry `Content-Type`, an immutable year-long
//! `Cache-Control`, `X-Cache: hit|miss` and a strong `ETag`. Failures are
//! JSON: `{"error": "<code>", "message": "<text>"}`.

use crate::cache::CacheStatsSnapshot;
use crate::config::ServiceConfig;
use crate::handler::{HandlerError, Rendered, Services};
use crate::policy::BlurPolicyConfig;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const X_CACHE: &str = "x-cache";
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const HEALTHZ_STATUS: &str = "ok";

pub type AppState = Arc<Services>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            message: Some(self.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    revision: &'static str,
    cache: CacheStatsSnapshot,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/i/{image_id}", get(transform_image))
        .route("/healthz", get(healthz))
        .route(
            "/admin/blur-policy",
            get(get_blur_policy).put(put_blur_policy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn transform_image(
    State(services): State<AppState>,
    Path(image_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let rendered = services.handle(&image_id, &params).await?;
    Ok(image_response(rendered, &headers))
}

fn image_response(rendered: Rendered, request_headers: &HeaderMap) -> Response {
    let not_modified = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == rendered.etag));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL),
    );
    headers.insert(X_CACHE, HeaderValue::from_static(rendered.cache.as_str()));
    if let Ok(etag) = HeaderValue::from_str(&rendered.etag) {
        headers.insert(header::ETAG, etag);
    }
    if not_modified {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }
    if let Ok(content_type) = HeaderValue::from_str(&rendered.content_type) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    (StatusCode::OK, headers, rendered.bytes).into_response()
}

async fn healthz(State(services): State<AppState>) -> impl IntoResponse {
    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
        revision: env!("IMS_BUILD_REVISION"),
        cache: services.cache.stats(),
    })
}

async fn get_blur_policy(State(services): State<AppState>) -> Json<BlurPolicyConfig> {
    Json(services.policy.snapshot().as_ref().clone())
}

async fn put_blur_policy(
    State(services): State<AppState>,
    Json(policy): Json<BlurPolicyConfig>,
) -> Json<BlurPolicyConfig> {
    services.set_policy(policy);
    Json(services.policy.snapshot().as_ref().clone())
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &ServiceConfig) -> Result<(), ServerError> {
    let address: SocketAddr =
        config
            .server
            .bind
            .parse()
            .map_err(|source| ServerError::InvalidListenAddr {
                address: config.server.bind.clone(),
                source,
            })?;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ServerError::Bind { address, source })?;

    let services = Arc::new(Services::from_config(config));
    info!(
        %address,
        storage = services.storage.is_configured(),
        cache_enabled = services.cache.is_enabled(),
        "ims listening"
    );

    axum::serve(listener, build_router(services))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|source| ServerError::Serve { source })?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to capture Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, draining"),
        _ = terminate => info!("received SIGTERM, draining"),
    }
}
