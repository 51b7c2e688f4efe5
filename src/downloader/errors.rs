// Error types for the download engine

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Faults raised by individual components (fetcher, resolver, workspace).
///
/// These never reach the caller directly: the job runner folds them into a
/// [`JobFailure`] or absorbs them as tier failures.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// yt-dlp could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A child process ran past its wall-clock budget and was killed
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Child process exited non-zero
    #[error("process exited with {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// Failed to parse yt-dlp output
    #[error("parse error: {0}")]
    Parse(String),

    /// Output directory holds nothing usable
    #[error("no usable output file in {0}")]
    EmptyOutput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Caller-visible failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Locator is not on an accepted host family; nothing was launched
    InvalidLocator,
    /// Every tier failed and at least one was rejected by upstream anti-automation
    UpstreamRejection,
    /// Every tier failed for generic reasons
    FetchFailed,
    /// Tool reported success but left no usable file
    EmptyArtifact,
    /// Job was cancelled before it finished
    Cancelled,
    /// Local fault (scratch directory, filesystem)
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidLocator => "invalid_locator",
            Self::UpstreamRejection => "upstream_rejection",
            Self::FetchFailed => "fetch_failed",
            Self::EmptyArtifact => "empty_artifact",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a job: `{kind, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_locator() -> Self {
        Self::new(
            FailureKind::InvalidLocator,
            "URL không hợp lệ. Vui lòng nhập URL YouTube.",
        )
    }

    /// All tiers exhausted. `diagnostic` is the last tier's stderr summary.
    pub fn exhausted(rejected: bool, diagnostic: &str) -> Self {
        let diagnostic = summarize_diagnostic(diagnostic);
        if rejected {
            Self::new(
                FailureKind::UpstreamRejection,
                format!(
                    "Máy chủ nguồn đang chặn yêu cầu tự động. Vui lòng thử lại sau. ({})",
                    diagnostic
                ),
            )
        } else {
            Self::new(
                FailureKind::FetchFailed,
                format!("Lỗi khi tải xuống: {}", diagnostic),
            )
        }
    }

    pub fn empty_artifact() -> Self {
        Self::new(
            FailureKind::EmptyArtifact,
            "Không tìm thấy file sau khi tải xuống.",
        )
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Đã hủy tải xuống.")
    }

    pub fn internal(err: &DownloadError) -> Self {
        Self::new(FailureKind::Internal, format!("Lỗi hệ thống: {}", err))
    }
}

/// Keep the last `ERROR:` line of yt-dlp stderr, or the last non-empty line.
pub fn summarize_diagnostic(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let picked = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .copied()
        .unwrap_or("no diagnostic output");

    picked.chars().take(300).collect()
}
