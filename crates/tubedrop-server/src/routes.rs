use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::io::ReaderStream;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tubedrop_core::{AppError, Clock, DownloadRequest, JobId, MediaFetcher, Quality};

use crate::dto::{
    DownloadRequestBody, DownloadResponse, HealthResponse, ProgressResponse, ThumbnailRequest,
    VideoInfoRequest, VideoInfoResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// JSON bodies only ever carry a URL and two options.
const JSON_BODY_LIMIT: usize = 16 * 1024;

/// Build the full router with all routes and middleware.
pub fn router<M: MediaFetcher, C: Clock>(state: Arc<AppState<M, C>>) -> Router {
    let api = Router::new()
        .route("/api/video-info", post(video_info::<M, C>))
        .route("/api/download", post(download::<M, C>))
        .route("/api/progress/{download_id}", get(progress::<M, C>))
        .route("/api/download-file/{download_id}", get(download_file::<M, C>))
        .route("/api/download-thumbnail", post(download_thumbnail::<M, C>))
        .route(
            "/api/download-thumbnail/{download_id}",
            get(job_thumbnail::<M, C>),
        )
        .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));

    let public = Router::new()
        .route("/health", get(health::<M, C>))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Video info
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/video-info",
    request_body = VideoInfoRequest,
    responses(
        (status = 200, description = "Video metadata", body = VideoInfoResponse),
        (status = 400, description = "Invalid URL or extraction failed", body = crate::dto::ErrorResponse),
    ),
    tag = "videos"
)]
pub async fn video_info<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let info = state.service.video_info(&body.url).await?;
    Ok(Json(VideoInfoResponse::from(info)))
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/download",
    request_body = DownloadRequestBody,
    responses(
        (status = 200, description = "Download started", body = DownloadResponse),
        (status = 400, description = "Invalid URL or quality", body = crate::dto::ErrorResponse),
    ),
    tag = "downloads"
)]
pub async fn download<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    payload: Result<Json<DownloadRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let quality: Quality = body.quality.parse().map_err(AppError::InvalidInput)?;
    let request = DownloadRequest::new(body.url, quality).with_thumbnail(body.download_thumbnail);

    let id = state.service.submit(request).await?;

    Ok(Json(DownloadResponse {
        download_id: id.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/progress/{download_id}",
    params(("download_id" = String, Path, description = "Download identifier")),
    responses(
        (status = 200, description = "Current job state", body = ProgressResponse),
    ),
    tag = "downloads"
)]
pub async fn progress<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    Path(download_id): Path<String>,
) -> impl IntoResponse {
    let record = state.service.progress(&JobId::from(download_id));
    Json(ProgressResponse::from(record))
}

#[utoipa::path(
    get,
    path = "/api/download-file/{download_id}",
    params(("download_id" = String, Path, description = "Download identifier")),
    responses(
        (status = 200, description = "The downloaded media file"),
        (status = 404, description = "Job unknown, unfinished or reclaimed", body = crate::dto::ErrorResponse),
    ),
    tag = "downloads"
)]
pub async fn download_file<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    Path(download_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = JobId::from(download_id);
    let done = state.service.deliverable(&id).await?;

    let response = attachment(&done.file_path, &done.filename).await?;
    state.service.mark_delivered(&id);
    Ok(response)
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/download-thumbnail",
    request_body = ThumbnailRequest,
    responses(
        (status = 200, description = "Thumbnail image"),
        (status = 400, description = "Invalid URL or extraction failed", body = crate::dto::ErrorResponse),
        (status = 500, description = "Thumbnail could not be fetched", body = crate::dto::ErrorResponse),
    ),
    tag = "thumbnails"
)]
pub async fn download_thumbnail<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    payload: Result<Json<ThumbnailRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let thumbnail = state.service.thumbnail(&body.url).await?;

    let response = attachment(&thumbnail.path, &thumbnail.filename).await;
    state.service.release_thumbnail(&thumbnail);
    response
}

#[utoipa::path(
    get,
    path = "/api/download-thumbnail/{download_id}",
    params(("download_id" = String, Path, description = "Download identifier")),
    responses(
        (status = 200, description = "Thumbnail saved with the download"),
        (status = 404, description = "No thumbnail for this job", body = crate::dto::ErrorResponse),
    ),
    tag = "thumbnails"
)]
pub async fn job_thumbnail<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
    Path(download_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = JobId::from(download_id);
    let thumbnail = state.service.job_thumbnail(&id).await?;

    let response = attachment(&thumbnail.path, &thumbnail.filename).await?;
    state.service.mark_delivered(&id);
    Ok(response)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health<M: MediaFetcher, C: Clock>(
    State(state): State<Arc<AppState<M, C>>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        jobs: state.service.job_count(),
    })
}

// ---------------------------------------------------------------------------
// File responses
// ---------------------------------------------------------------------------

/// Stream `path` as an attachment named `filename`.
async fn attachment(path: &FsPath, filename: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| AppError::NotFound("File not found".to_string()))?;
    let len = file.metadata().await.ok().map(|m| m.len());

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(filename)));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(filename)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Some(len) = len {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "opus" => "audio/opus",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
