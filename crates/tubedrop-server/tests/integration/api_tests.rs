use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::Notify;
use tower::ServiceExt;

use tubedrop_core::testutil::MockFetcher;
use tubedrop_core::{DownloadProgress, FetchError};

use crate::integration::common::{
    TestApp, VIDEO_URL, post_json, send, send_json, setup_test_app, start_download,
    wait_for_terminal,
};

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn service_dirs(root: &Path, prefix: &str) -> Vec<String> {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(prefix))
        .collect()
}

async fn wait_until_removed(app: &TestApp, prefix: &str) {
    for _ in 0..200 {
        if service_dirs(app.workspace.path(), prefix).is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{prefix} directories were not reclaimed");
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["jobs"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(&app, get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/download"].is_object());
}

// ---------------------------------------------------------------------------
// Video info
// ---------------------------------------------------------------------------

#[tokio::test]
async fn video_info_returns_summary() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(
        &app,
        post_json("/api/video-info", serde_json::json!({"url": VIDEO_URL})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Mock Video");
    assert_eq!(json["video_id"], "dQw4w9WgXcQ");
    let heights: Vec<u64> = json["available_qualities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["height"].as_u64().unwrap())
        .collect();
    assert_eq!(heights, vec![1080, 720, 360]);
}

#[tokio::test]
async fn video_info_rejects_invalid_url() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(
        &app,
        post_json("/api/video-info", serde_json::json!({"url": "https://vimeo.com/123"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_input");
    assert_eq!(
        json["message"],
        "Invalid YouTube URL. Please enter a valid YouTube video URL."
    );
    assert_eq!(app.fetcher.metadata_calls(), 0);
}

#[tokio::test]
async fn video_info_requires_url() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(&app, post_json("/api/video-info", serde_json::json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "URL is required");
}

#[tokio::test]
async fn video_info_private_video_returns_400() {
    let fetcher = MockFetcher::new().with_metadata(Err(FetchError::from_message(
        "ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access",
    )));
    let app = setup_test_app(fetcher);

    let (status, json) = send_json(
        &app,
        post_json("/api/video-info", serde_json::json!({"url": VIDEO_URL})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "extraction_error");
    assert_eq!(json["message"], "This video is private.");
    assert_eq!(app.fetcher.metadata_calls(), 1);
}

#[tokio::test]
async fn malformed_json_returns_structured_400() {
    let app = setup_test_app(MockFetcher::new());

    let request = Request::post("/api/video-info")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_input");
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_lifecycle_delivers_and_reclaims() {
    let app = setup_test_app(MockFetcher::new());

    let id = start_download(
        &app,
        serde_json::json!({"url": VIDEO_URL, "quality": "high"}),
    )
    .await;
    let json = wait_for_terminal(&app, &id).await;
    assert_eq!(json["status"], "finished");
    assert_eq!(json["filename"], "Mock Video.mp4");
    assert_eq!(json["has_thumbnail"], false);
    assert!(json.get("file_path").is_none());

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/download-file/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    let disposition = response.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("Mock%20Video.mp4"));
    let (_, body) = send(&app, get(&format!("/api/download-file/{id}"))).await;
    assert_eq!(body, b"mock media");

    app.clock.advance(Duration::from_secs(10));
    wait_until_removed(&app, "ytdl_").await;

    let (_, json) = send_json(&app, get(&format!("/api/progress/{id}"))).await;
    assert_eq!(json["status"], "not_found");
}

#[tokio::test]
async fn download_rejects_unknown_quality() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(
        &app,
        post_json(
            "/api/download",
            serde_json::json!({"url": VIDEO_URL, "quality": "ultra"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("ultra"));
    assert!(service_dirs(app.workspace.path(), "ytdl_").is_empty());
}

#[tokio::test]
async fn download_rejects_invalid_url_without_creating_job() {
    let app = setup_test_app(MockFetcher::new());

    let (status, _) = send_json(
        &app,
        post_json("/api/download", serde_json::json!({"url": "not a url"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, health) = send_json(&app, get("/health")).await;
    assert_eq!(health["jobs"], 0);
}

#[tokio::test]
async fn progress_for_unknown_id_is_not_found() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(&app, get("/api/progress/1700000000_deadbeef")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"status": "not_found"}));
}

#[tokio::test]
async fn download_file_for_unknown_id_returns_404() {
    let app = setup_test_app(MockFetcher::new());

    let (status, json) = send_json(&app, get("/api/download-file/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["message"], "File not found");
}

#[tokio::test]
async fn progress_reports_downloading_and_file_is_withheld() {
    let gate = Arc::new(Notify::new());
    let fetcher = MockFetcher::new()
        .with_progress(vec![DownloadProgress::new("42.0%", "1.00MiB/s", 420, 1000)])
        .with_gate(gate.clone());
    let app = setup_test_app(fetcher);

    let id = start_download(&app, serde_json::json!({"url": VIDEO_URL})).await;

    let mut seen = serde_json::Value::Null;
    for _ in 0..200 {
        let (_, json) = send_json(&app, get(&format!("/api/progress/{id}"))).await;
        if json["status"] == "downloading" {
            seen = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen["percent"], "42.0%");
    assert_eq!(seen["speed"], "1.00MiB/s");
    assert_eq!(seen["downloaded_bytes"], 420);
    assert_eq!(seen["total_bytes"], 1000);

    let (status, _) = send_json(&app, get(&format!("/api/download-file/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    gate.notify_one();
    let json = wait_for_terminal(&app, &id).await;
    assert_eq!(json["status"], "finished");
}

#[tokio::test]
async fn transient_failure_falls_back_to_next_profile() {
    let fetcher = MockFetcher::new().with_download_results(vec![
        Err(FetchError::from_message(
            "ERROR: [youtube] dQw4w9WgXcQ: Failed to extract any player response",
        )),
        Ok(()),
    ]);
    let app = setup_test_app(fetcher);

    let id = start_download(&app, serde_json::json!({"url": VIDEO_URL})).await;
    let json = wait_for_terminal(&app, &id).await;

    assert_eq!(json["status"], "finished");
    assert_eq!(app.fetcher.download_profiles(), vec!["primary", "fallback"]);
}

#[tokio::test]
async fn terminal_failure_reports_error_and_removes_workspace() {
    let fetcher = MockFetcher::new().with_download_results(vec![Err(FetchError::from_message(
        "ERROR: [youtube] dQw4w9WgXcQ: Video unavailable",
    ))]);
    let app = setup_test_app(fetcher);

    let id = start_download(&app, serde_json::json!({"url": VIDEO_URL})).await;
    let json = wait_for_terminal(&app, &id).await;

    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "This video is not available for download.");
    assert_eq!(app.fetcher.download_profiles(), vec!["primary"]);
    assert!(service_dirs(app.workspace.path(), "ytdl_").is_empty());

    let (status, _) = send_json(&app, get(&format!("/api/download-file/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_thumbnail_is_served_when_requested() {
    let app = setup_test_app(MockFetcher::new());

    let id = start_download(
        &app,
        serde_json::json!({"url": VIDEO_URL, "download_thumbnail": true}),
    )
    .await;
    let json = wait_for_terminal(&app, &id).await;
    assert_eq!(json["has_thumbnail"], true);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/download-thumbnail/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let disposition = response.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.contains("dQw4w9WgXcQ_thumbnail.jpg"));
}

#[tokio::test]
async fn job_thumbnail_missing_returns_404() {
    let app = setup_test_app(MockFetcher::new());

    let id = start_download(&app, serde_json::json!({"url": VIDEO_URL})).await;
    wait_for_terminal(&app, &id).await;

    let (status, json) = send_json(&app, get(&format!("/api/download-thumbnail/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Thumbnail not found");
}

#[tokio::test]
async fn standalone_thumbnail_is_streamed_then_reclaimed() {
    let app = setup_test_app(MockFetcher::new());

    let (status, body) = send(
        &app,
        post_json("/api/download-thumbnail", serde_json::json!({"url": VIDEO_URL})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"\xff\xd8\xff"));
    assert_eq!(
        app.fetcher.thumbnail_urls(),
        vec!["https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"]
    );
    assert_eq!(service_dirs(app.workspace.path(), "thumbnail_").len(), 1);

    app.clock.advance(Duration::from_secs(10));
    wait_until_removed(&app, "thumbnail_").await;
}

#[tokio::test]
async fn standalone_thumbnail_fetch_failure_returns_500() {
    let fetcher = MockFetcher::new().with_thumbnail_error(FetchError::from_message("HTTP 404"));
    let app = setup_test_app(fetcher);

    let (status, json) = send_json(
        &app,
        post_json("/api/download-thumbnail", serde_json::json!({"url": VIDEO_URL})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["message"].as_str().unwrap().contains("Failed to download thumbnail."));
    assert!(service_dirs(app.workspace.path(), "thumbnail_").is_empty());
}
