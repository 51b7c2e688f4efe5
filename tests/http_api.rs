mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::{harness, Attempt, ScriptedFetcher};
use tubegrab::downloader::{ProgressStatus, ProgressStore, ScratchRoot};
use tubegrab::build_state;
use tubegrab::config::ServiceConfig;
use tubegrab::server::{router, AppState};

fn app(fetcher: ScriptedFetcher, scratch: &Path) -> Router {
    let h = harness(fetcher);
    router(AppState::new(Arc::new(h.runner), ScratchRoot::new(scratch)))
}

fn form(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn health_is_ok() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(get("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn unknown_job_polls_as_unknown() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(get("/check_progress?job_id=nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["percent"], 0);
    assert_eq!(body["status"], "unknown");
}

#[tokio::test]
async fn download_streams_artifact_and_cleans_scratch() {
    let scratch = tempfile::tempdir().unwrap();
    let app = app(
        ScriptedFetcher::new(vec![Attempt::ok("download.mp3", b"ID3 audio bytes")]),
        scratch.path(),
    );

    let response = app
        .clone()
        .oneshot(form(
            "/download",
            &[
                ("url", "https://youtu.be/abc123"),
                ("format_choice", "mp3"),
                ("quality", "highest"),
                ("job_id", "job-ok"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::CONTENT_LENGTH], "15");
    assert_eq!(headers["x-download-tier"], "primary");
    assert_eq!(headers["x-job-id"], "job-ok");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"My Song.mp3\""));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ID3 audio bytes");
    assert!(dir_is_empty(scratch.path()));

    let progress = json_body(app.oneshot(get("/check_progress?job_id=job-ok")).await.unwrap()).await;
    assert_eq!(progress["percent"], 100);
    assert_eq!(progress["status"], "complete");
}

#[tokio::test]
async fn degraded_download_reports_tier() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(
        ScriptedFetcher::new(vec![Attempt::rejected(), Attempt::ok("download.mp4", b"video")]),
        scratch.path(),
    )
    .oneshot(form(
        "/download",
        &[("url", "https://www.youtube.com/watch?v=abc123"), ("format_choice", "mp4")],
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-download-tier"], "fallback");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
}

#[tokio::test]
async fn invalid_locator_is_bad_request() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(form(
            "/download",
            &[("url", "https://example.com/v/abc"), ("format_choice", "mp3"), ("job_id", "bad")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-job-id"], "bad");
    let body = json_body(response).await;
    assert_eq!(body["kind"], "invalid_locator");
    assert_eq!(body["message"], "URL không hợp lệ. Vui lòng nhập URL YouTube.");
    assert!(dir_is_empty(scratch.path()));
}

#[tokio::test]
async fn unknown_format_is_bad_request() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(form(
            "/download",
            &[("url", "https://youtu.be/abc123"), ("format_choice", "flac")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_rejection_is_service_unavailable() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(
        ScriptedFetcher::new(vec![Attempt::rejected(), Attempt::rejected(), Attempt::rejected()]),
        scratch.path(),
    )
    .oneshot(form(
        "/download",
        &[("url", "https://youtu.be/abc123"), ("format_choice", "mp3")],
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "upstream_rejection");
    assert!(dir_is_empty(scratch.path()));
}

#[tokio::test]
async fn empty_artifact_is_bad_gateway() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(
        ScriptedFetcher::new(vec![Attempt::Succeed { lines: vec![], file: None }]),
        scratch.path(),
    )
    .oneshot(form(
        "/download",
        &[("url", "https://youtu.be/abc123"), ("format_choice", "mp3")],
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["kind"], "empty_artifact");
}

#[tokio::test]
async fn video_info_returns_probe_metadata() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(form(
            "/get_video_info",
            &[
                ("url", "https://www.youtube.com/watch?v=abc123"),
                ("format_choice", "mp3"),
                ("quality", "medium"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["videoId"], "abc123");
    assert_eq!(body["title"], "My Song");
    assert_eq!(body["format"], "audio");
    assert_eq!(body["quality"], "medium");
}

#[tokio::test]
async fn video_info_rejects_foreign_host() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]), scratch.path())
        .oneshot(form("/get_video_info", &[("url", "https://vimeo.com/123")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn video_info_probe_failure_is_server_error() {
    let scratch = tempfile::tempdir().unwrap();
    let response = app(ScriptedFetcher::new(vec![]).with_title(None), scratch.path())
        .oneshot(form("/get_video_info", &[("url", "https://youtu.be/abc123")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Lỗi khi xử lý video"));
}

#[tokio::test]
async fn client_disconnect_cancels_job() {
    let scratch = tempfile::tempdir().unwrap();
    let h = harness(ScriptedFetcher::new(vec![Attempt::Hang]));
    let store = h.store.clone();
    let app = router(AppState::new(Arc::new(h.runner), ScratchRoot::new(scratch.path())));

    let request = app.clone().oneshot(form(
        "/download",
        &[
            ("url", "https://youtu.be/abc123"),
            ("format_choice", "mp3"),
            ("job_id", "gone"),
        ],
    ));
    // The client gives up while the download hangs
    assert!(tokio::time::timeout(Duration::from_millis(100), request)
        .await
        .is_err());

    for _ in 0..100 {
        if store.snapshot("gone").status == ProgressStatus::Error && dir_is_empty(scratch.path()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let progress = json_body(app.oneshot(get("/check_progress?job_id=gone")).await.unwrap()).await;
    assert_eq!(progress["status"], "error");
    assert_eq!(progress["percent"], 30);
    assert!(dir_is_empty(scratch.path()));
}

#[tokio::test]
async fn configured_domains_gate_the_info_endpoint() {
    let scratch = tempfile::tempdir().unwrap();
    let config = ServiceConfig::default()
        .with_bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_ytdlp_path(Some("/nonexistent/yt-dlp".to_string()))
        .with_scratch_root(scratch.path())
        .with_domains(vec!["media.test".to_string()], vec![]);
    let app = router(build_state(&config));

    let response = app
        .clone()
        .oneshot(form("/get_video_info", &[("url", "https://youtu.be/abc123")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Accepted host, but the configured binary cannot be started
    let response = app
        .oneshot(form("/get_video_info", &[("url", "https://media.test/watch?v=abc123")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
