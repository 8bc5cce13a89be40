use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use tubedrop_core::testutil::{ManualClock, MockFetcher, MockReporter};
use tubedrop_core::{DownloadService, ExtractionProfile, JitterConfig, ServiceConfig};
use tubedrop_server::routes;
use tubedrop_server::state::AppState;

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

pub struct TestApp {
    pub router: Router,
    pub fetcher: MockFetcher,
    pub clock: ManualClock,
    pub workspace: TempDir,
}

/// Build the router over a mock collaborator, a manual clock and a temp
/// workspace root. Jitter and inter-profile backoff are disabled.
pub fn setup_test_app(fetcher: MockFetcher) -> TestApp {
    let workspace = tempfile::tempdir().expect("Failed to create workspace root");
    let clock = ManualClock::default();

    let config = ServiceConfig::default()
        .with_workspace_root(workspace.path())
        .with_jitter(JitterConfig::disabled())
        .with_profile_backoff(Duration::ZERO)
        .with_profiles(vec![
            ExtractionProfile::new("primary", &["android", "web"]),
            ExtractionProfile::new("fallback", &["web"]),
        ]);
    let service = DownloadService::new(fetcher.clone(), clock.clone(), config)
        .with_reporter(Arc::new(MockReporter::new()));

    TestApp {
        router: routes::router(Arc::new(AppState::new(service))),
        fetcher,
        clock,
        workspace,
    }
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (axum::http::StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

pub async fn send_json(app: &TestApp, request: Request<Body>) -> (axum::http::StatusCode, serde_json::Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Submit a download and return its id.
pub async fn start_download(app: &TestApp, body: serde_json::Value) -> String {
    let (status, json) = send_json(app, post_json("/api/download", body)).await;
    assert_eq!(status, axum::http::StatusCode::OK, "submit failed: {json}");
    json["download_id"].as_str().unwrap().to_string()
}

/// Poll the progress route until the job leaves its non-terminal states.
pub async fn wait_for_terminal(app: &TestApp, id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (_, json) = send_json(
            app,
            Request::get(format!("/api/progress/{id}")).body(Body::empty()).unwrap(),
        )
        .await;
        if matches!(json["status"].as_str(), Some("finished" | "error")) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state");
}
