use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::control::pipeline::UploadPipeline;
use crate::core::auth::TokenValidator;
use crate::core::config::AppConfig;
use crate::core::security::MAX_JSON_BODY_BYTES;
use crate::storage::LocalDelivery;

use super::handlers;
use super::middleware::RequestIdLayer;

/// Bytes allowed on top of the file ceiling for multipart framing and
/// unrelated form fields.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: UploadPipeline,
    pub auth: Arc<dyn TokenValidator>,
    /// Present only for the in-memory backend, which serves its own objects.
    pub local: Option<LocalDelivery>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
    pub metrics_handle: PrometheusHandle,
}

/// Build the full Axum router.
///
/// - `POST /api/videos`, `GET /api/videos`, `GET /api/videos/{video_id}`
/// - `POST /api/video_upload/{video_id}`, `POST /api/thumbnail_upload/{video_id}`
/// - `GET /assets/{bucket}/{*key}`
/// - `GET /healthz`, `/readyz`, `/metrics`
///
/// Each upload route carries its own body ceiling; everything else is held
/// to the small JSON limit.
pub fn build_router(state: AppState) -> Router {
    let upload = &state.config.upload;
    let video_limit = body_limit(upload.max_video_bytes);
    let thumbnail_limit = body_limit(upload.max_thumbnail_bytes);

    tracing::info!(
        max_video_bytes = upload.max_video_bytes,
        max_thumbnail_bytes = upload.max_thumbnail_bytes,
        cors_origins = ?state.config.server.cors_allowed_origins,
        "http configuration loaded"
    );

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    let uploads = Router::new()
        .route(
            "/api/video_upload/{video_id}",
            post(handlers::upload_video).layer(video_limit),
        )
        .route(
            "/api/thumbnail_upload/{video_id}",
            post(handlers::upload_thumbnail).layer(thumbnail_limit),
        );

    let api = Router::new()
        .route(
            "/api/videos",
            get(handlers::list_videos).post(handlers::create_video),
        )
        .route("/api/videos/{video_id}", get(handlers::get_video))
        .route("/assets/{bucket}/{*key}", get(handlers::serve_asset))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_JSON_BODY_BYTES));

    Router::new()
        .merge(uploads)
        .merge(api)
        .layer(cors)
        .layer(RequestIdLayer)
        .with_state(state)
}

fn body_limit(max_file_bytes: u64) -> DefaultBodyLimit {
    let limit = max_file_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
