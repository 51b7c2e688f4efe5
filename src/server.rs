// HTTP surface: submit, poll and info endpoints

use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::downloader::{
    FailureKind, Job, JobFailure, JobRunner, MediaFormat, ProgressEntry, ProgressStatus,
    ProgressStore, QualityTier, ScratchRoot,
};

const X_DOWNLOAD_TIER: HeaderName = HeaderName::from_static("x-download-tier");
const X_JOB_ID: HeaderName = HeaderName::from_static("x-job-id");

const MSG_BAD_REQUEST: &str = "Yêu cầu không hợp lệ";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    runner: Arc<JobRunner>,
    scratch: ScratchRoot,
}

impl AppState {
    pub fn new(runner: Arc<JobRunner>, scratch: ScratchRoot) -> Self {
        Self { runner, scratch }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    pub url: String,
    pub format_choice: Option<String>,
    pub quality: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub job_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/get_video_info", post(video_info_handler))
        .route("/download", post(download_handler))
        .route("/check_progress", get(check_progress_handler))
        .with_state(state)
}

/// GET /health
async fn health_handler() -> &'static str {
    "ok"
}

/// POST /get_video_info
async fn video_info_handler(
    State(state): State<AppState>,
    Form(form): Form<DownloadForm>,
) -> Response {
    let classification = state.runner.classifier().classify(&form.url);
    if !classification.valid {
        let failure = JobFailure::invalid_locator();
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": failure.message }))).into_response();
    }

    match state.runner.fetcher().probe_info(form.url.trim()).await {
        Ok(info) => {
            let format = form
                .format_choice
                .as_deref()
                .and_then(MediaFormat::parse)
                .unwrap_or(MediaFormat::Video);
            let quality = QualityTier::parse(form.quality.as_deref());
            Json(json!({
                "success": true,
                "videoId": classification.resource_id.unwrap_or(info.id),
                "title": info.title,
                "uploader": info.uploader,
                "duration": info.duration,
                "thumbnail": info.thumbnail,
                "format": format.as_str(),
                "quality": quality.as_str(),
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!(url = %form.url, error = %e, "info probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Lỗi khi xử lý video: {}", e) })),
            )
                .into_response()
        }
    }
}

/// GET /check_progress?job_id=
async fn check_progress_handler(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Json<ProgressEntry> {
    let job_id = query.job_id.unwrap_or_default();
    Json(state.runner.store().snapshot(job_id.trim()))
}

/// POST /download - runs the job and streams the artifact back
async fn download_handler(
    State(state): State<AppState>,
    Form(form): Form<DownloadForm>,
) -> Response {
    let Some(format) = form.format_choice.as_deref().and_then(MediaFormat::parse) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "kind": "invalid_request", "message": MSG_BAD_REQUEST })),
        )
            .into_response();
    };
    let job = Job::new(
        form.job_id,
        form.url,
        format,
        QualityTier::parse(form.quality.as_deref()),
    );

    let scratch = match state.scratch.create_job_dir(&job.job_id).await {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to create scratch directory");
            let failure = JobFailure::internal(&e);
            state.runner.store().put(
                &job.job_id,
                ProgressEntry::new(0, ProgressStatus::Error, failure.message.clone()),
            );
            return failure_response(&job.job_id, &failure);
        }
    };

    // The job runs on its own task; if the client goes away the guard cancels
    // it and the runner still publishes the terminal error entry.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let runner = state.runner.clone();
    let task_job = job.clone();
    let handle = tokio::spawn(async move {
        let result = runner.run(&task_job, scratch.path(), &cancel).await;
        (scratch, result)
    });
    let joined = handle.await;
    guard.disarm();

    let (mut scratch, result) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            tracing::error!(job_id = %job.job_id, error = %e, "job task failed");
            let failure = JobFailure::new(FailureKind::Internal, format!("Lỗi hệ thống: {}", e));
            let store = state.runner.store();
            let percent = store.get(&job.job_id).map_or(0, |entry| entry.percent);
            store.put(
                &job.job_id,
                ProgressEntry::new(percent, ProgressStatus::Error, failure.message.clone()),
            );
            return failure_response(&job.job_id, &failure);
        }
    };

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(failure) => {
            if let Err(e) = scratch.cleanup().await {
                tracing::warn!(job_id = %job.job_id, error = %e, "scratch cleanup failed");
            }
            return failure_response(&job.job_id, &failure);
        }
    };

    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(job_id = %job.job_id, error = %e, "artifact vanished before streaming");
            return failure_response(&job.job_id, &JobFailure::empty_artifact());
        }
    };

    // The scratch directory lives exactly as long as the body stream
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _scratch = &scratch;
        chunk
    });

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(artifact.content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(artifact.byte_size));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&artifact.display_name)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert(X_DOWNLOAD_TIER, HeaderValue::from_static(artifact.tier.as_str()));
    if let Ok(value) = HeaderValue::from_str(&job.job_id) {
        headers.insert(X_JOB_ID, value);
    }

    (headers, Body::from_stream(stream)).into_response()
}

/// HTTP status for a terminal job failure
pub fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::InvalidLocator => StatusCode::BAD_REQUEST,
        FailureKind::UpstreamRejection => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::FetchFailed | FailureKind::EmptyArtifact => StatusCode::BAD_GATEWAY,
        FailureKind::Cancelled | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(job_id: &str, failure: &JobFailure) -> Response {
    let mut response = (failure_status(failure.kind), Json(failure)).into_response();
    if let Ok(value) = HeaderValue::from_str(job_id) {
        response.headers_mut().insert(X_JOB_ID, value);
    }
    response
}

/// `attachment` with an ASCII `filename` and the exact name as RFC 5987 `filename*`
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}
