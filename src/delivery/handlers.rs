use std::ffi::OsString;
use std::time::Duration;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::control::pipeline::UploadedVideo;
use crate::core::auth::bearer_token;
use crate::core::error::{IngestError, UploadError};
use crate::core::redact::redact_bearer_token;
use crate::core::security::{validate_description, validate_title};
use crate::core::types::{UploadKind, UserId, Video, VideoId};
use crate::ingest::multipart::receive_upload;
use crate::media::run_tool;
use crate::observability::metrics as obs;
use crate::storage::signer::Verification;

use super::router::AppState;

/// Deadline for the `-version` checks run by `/readyz`.
const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

/// Log an `UploadError` at a level matching its status and render it.
///
/// Server-side failures log the full error chain; clients only see the
/// generic public message.
fn upload_error_response(err: &UploadError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, code = err.error_code(), "request failed");
    } else {
        debug!(error = %err, code = err.error_code(), "request rejected");
    }
    error_json(status, err.error_code(), &err.public_message())
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        upload_error_response(&self)
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn parse_video_id(raw: &str) -> Result<VideoId, UploadError> {
    raw.parse::<VideoId>()
        .map_err(|_| UploadError::InvalidVideoId {
            value: raw.to_string(),
        })
}

/// Resolve the caller from the `Authorization` header.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, UploadError> {
    let token = bearer_token(headers).inspect_err(|_| {
        debug!(
            authorization = %redact_bearer_token(
                headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
            ),
            "auth failed: missing or malformed header"
        );
    })?;
    Ok(state.auth.validate_token(token)?)
}

// ---------------------------------------------------------------------------
// Video record endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// `POST /api/videos`: create a draft record owned by the caller.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateVideoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Video>), UploadError> {
    let user_id = authenticate(&state, &headers)?;
    let Json(body) = body.map_err(|e| UploadError::InvalidRequest {
        reason: e.body_text(),
    })?;

    validate_title(&body.title).map_err(|reason| UploadError::InvalidRequest { reason })?;
    validate_description(body.description.as_deref())
        .map_err(|reason| UploadError::InvalidRequest { reason })?;

    let video = state
        .pipeline
        .repository()
        .create_video(Video::new(user_id, body.title, body.description))
        .await?;

    info!(video_id = %video.id, %user_id, "video created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/videos`: the caller's records, newest first, with signed URLs.
pub async fn list_videos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Video>>, UploadError> {
    let user_id = authenticate(&state, &headers)?;
    let videos = state.pipeline.repository().list_videos(user_id).await?;
    let videos = state.pipeline.sign_videos(videos).await?;
    Ok(Json(videos))
}

/// `GET /api/videos/{video_id}`: one record with a freshly signed URL.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, UploadError> {
    let video_id = parse_video_id(&video_id)?;
    let video = state.pipeline.repository().get_video(video_id).await?;
    Ok(Json(state.pipeline.sign_video(video).await?))
}

// ---------------------------------------------------------------------------
// Upload endpoints
// ---------------------------------------------------------------------------

/// `POST /api/video_upload/{video_id}`: multipart field `video`.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadedVideo>, UploadError> {
    let (video, multipart) = admit(&state, &video_id, &headers, multipart).await?;
    let deadline = Duration::from_secs(state.config.upload.upload_timeout_secs);
    let uploaded = with_deadline(deadline, receive_video(&state, video, multipart)).await?;
    Ok(Json(uploaded))
}

async fn receive_video(
    state: &AppState,
    video: Video,
    multipart: Multipart,
) -> Result<UploadedVideo, UploadError> {
    let upload = receive_upload(
        multipart,
        UploadKind::Video,
        &state.config.upload.spool_dir(),
        state.config.upload.max_video_bytes,
    )
    .await?;
    state.pipeline.publish_video(video, upload).await
}

/// `POST /api/thumbnail_upload/{video_id}`: multipart field `thumbnail`.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Video>, UploadError> {
    let (video, multipart) = admit(&state, &video_id, &headers, multipart).await?;
    let deadline = Duration::from_secs(state.config.upload.upload_timeout_secs);
    let video = with_deadline(deadline, receive_thumbnail(&state, video, multipart)).await?;
    Ok(Json(video))
}

async fn receive_thumbnail(
    state: &AppState,
    video: Video,
    multipart: Multipart,
) -> Result<Video, UploadError> {
    let upload = receive_upload(
        multipart,
        UploadKind::Thumbnail,
        &state.config.upload.spool_dir(),
        state.config.upload.max_thumbnail_bytes,
    )
    .await?;
    state.pipeline.publish_thumbnail(video, upload).await
}

/// Identifier, token and ownership checks. Nothing here reads the body.
async fn admit(
    state: &AppState,
    raw_video_id: &str,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(Video, Multipart), UploadError> {
    let video_id = parse_video_id(raw_video_id)?;
    let user_id = authenticate(state, headers)?;
    let video = state.pipeline.authorize(video_id, user_id).await?;
    let multipart = multipart.map_err(|e| {
        UploadError::Ingest(IngestError::MalformedMultipart {
            reason: e.body_text(),
        })
    })?;
    debug!(%video_id, %user_id, "upload admitted");
    Ok((video, multipart))
}

/// Run `fut` under the upload deadline. Dropping it on expiry kills any
/// running media tool and deletes the spools.
async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, UploadError>
where
    F: std::future::Future<Output = Result<T, UploadError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_secs = deadline.as_secs(), "upload deadline exceeded");
            Err(UploadError::Timeout {
                timeout_secs: deadline.as_secs(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Asset delivery (in-memory backend)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub expires: Option<i64>,
    pub nonce: Option<String>,
    pub signature: Option<String>,
}

/// `GET /assets/{bucket}/{*key}`: serve an object from the in-memory store.
///
/// Requests carrying a signature are verified against it. Unsigned requests
/// are only served for unprefixed keys, which is where public thumbnails
/// live; orientation-prefixed video objects always need a signature.
pub async fn serve_asset(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<AssetQuery>,
) -> Response {
    let response = asset_response(&state, &bucket, &key, query).await;
    obs::inc_asset_request(obs::status_class(response.status().as_u16()));
    response
}

async fn asset_response(state: &AppState, bucket: &str, key: &str, query: AssetQuery) -> Response {
    let Some(local) = state.local.as_ref() else {
        return error_json(StatusCode::NOT_FOUND, "not_found", "Not found");
    };

    match (query.expires, query.nonce, query.signature) {
        (Some(expires), Some(nonce), Some(signature)) => {
            let now = Utc::now().timestamp();
            match local
                .signer
                .verify(bucket, key, expires, &nonce, &signature, now)
            {
                Verification::Valid => {}
                Verification::Expired => {
                    debug!(bucket, key, expires, "signed URL expired");
                    return error_json(StatusCode::FORBIDDEN, "url_expired", "URL has expired");
                }
                Verification::Invalid => {
                    warn!(bucket, key, "signed URL rejected");
                    return error_json(
                        StatusCode::FORBIDDEN,
                        "invalid_signature",
                        "Invalid signature",
                    );
                }
            }
        }
        (None, None, None) if !key.contains('/') => {}
        _ => {
            return error_json(
                StatusCode::FORBIDDEN,
                "signature_required",
                "A signed URL is required",
            );
        }
    }

    match local.store.get(bucket, key).await {
        Ok(object) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, object.content_type),
                (header::CACHE_CONTROL, "private, max-age=300".to_string()),
            ],
            object.data,
        )
            .into_response(),
        Err(e) => {
            debug!(bucket, key, error = %e, "asset not found");
            error_json(StatusCode::NOT_FOUND, "not_found", "Not found")
        }
    }
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /metrics`: Prometheus text exposition format.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let metrics = state.metrics_handle.render();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
        .into_response()
}

/// `GET /healthz`: Liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /readyz`: Readiness probe.
///
/// Checks the object store and that both media tools start.
pub async fn readyz(State(state): State<AppState>) -> Response {
    let mut checks = serde_json::Map::new();
    let mut all_ok = true;

    match state.pipeline.store().health_check().await {
        Ok(()) => {
            checks.insert("storage".to_string(), serde_json::json!({"status": "ok"}));
        }
        Err(e) => {
            all_ok = false;
            checks.insert(
                "storage".to_string(),
                serde_json::json!({"status": "error", "error": e.to_string()}),
            );
        }
    }

    let media = &state.config.media;
    for (tool, program) in [
        ("ffprobe", media.ffprobe_path.as_str()),
        ("ffmpeg", media.ffmpeg_path.as_str()),
    ] {
        let args = vec![OsString::from("-version")];
        match run_tool(tool, program, args, TOOL_CHECK_TIMEOUT).await {
            Ok(_) => {
                checks.insert(tool.to_string(), serde_json::json!({"status": "ok"}));
            }
            Err(e) => {
                all_ok = false;
                checks.insert(
                    tool.to_string(),
                    serde_json::json!({"status": "error", "error": e.to_string()}),
                );
            }
        }
    }

    let (http_status, status) = if all_ok {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        http_status,
        Json(serde_json::json!({
            "status": status,
            "storage_backend": state.pipeline.store().backend(),
            "checks": checks,
        })),
    )
        .into_response()
}
