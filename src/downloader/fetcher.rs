// Fetcher trait definition and per-attempt session handle

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::DownloadError;
use super::models::{ProgressEvent, VideoInfo};
use super::strategy::Strategy;

/// How a fetch attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchExit {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stderr: String,
}

impl FetchExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// One running attempt: a finite stream of progress events, then an exit.
///
/// Dropping the session aborts the attempt; implementations must make sure
/// that kills the underlying process.
pub struct FetchSession {
    events: mpsc::Receiver<ProgressEvent>,
    exit: Option<JoinHandle<Result<FetchExit, DownloadError>>>,
}

impl FetchSession {
    /// `exit` must finish only after the sending half of `events` is dropped.
    pub fn new(
        events: mpsc::Receiver<ProgressEvent>,
        exit: JoinHandle<Result<FetchExit, DownloadError>>,
    ) -> Self {
        Self {
            events,
            exit: Some(exit),
        }
    }

    /// Next progress event, or `None` once the output stream has closed.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the attempt to finish.
    pub async fn wait(mut self) -> Result<FetchExit, DownloadError> {
        let Some(handle) = self.exit.take() else {
            return Err(DownloadError::Io(std::io::Error::other(
                "fetch session already finished",
            )));
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(DownloadError::Io(std::io::Error::other(e))),
        }
    }
}

impl Drop for FetchSession {
    fn drop(&mut self) {
        if let Some(handle) = self.exit.take() {
            handle.abort();
        }
    }
}

/// External retrieval tool
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of the fetcher (for logging)
    fn name(&self) -> &'static str;

    /// Start one attempt for `strategy`. An error here is a tier failure.
    async fn launch(&self, strategy: &Strategy, locator: &str) -> Result<FetchSession, DownloadError>;

    /// Metadata-only call returning the resource title
    async fn probe_title(&self, locator: &str) -> Result<String, DownloadError>;

    /// Metadata-only call returning the full info record
    async fn probe_info(&self, locator: &str) -> Result<VideoInfo, DownloadError>;
}

lazy_static! {
    static ref PROGRESS_RE: Regex =
        Regex::new(r"^\s*(\d+)(?:\.\d+)?\s*/\s*(\d+)(?:\.\d+)?\s*$").expect("valid progress regex");
}

/// Parse a `<downloaded>/<total>` line. Anything else, or a zero total, is dropped.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let caps = PROGRESS_RE.captures(line)?;
    let downloaded: u64 = caps.get(1)?.as_str().parse().ok()?;
    let total: u64 = caps.get(2)?.as_str().parse().ok()?;
    if total == 0 {
        return None;
    }
    Some(ProgressEvent { downloaded, total })
}
