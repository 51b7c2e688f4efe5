// Job runner with tiered fallback logic

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::classifier::UrlClassifier;
use super::diagnostics::{diagnose, BlockingReason};
use super::errors::{summarize_diagnostic, DownloadError, FailureKind, JobFailure};
use super::fetcher::Fetcher;
use super::models::{Artifact, Job, ProgressEntry, ProgressEvent, ProgressStatus};
use super::progress::ProgressStore;
use super::resolver::{build_artifact, clear_outputs, locate_output};
use super::strategy::{Strategy, StrategyBuilder, TierKind};

const MSG_STARTING: &str = "Đang khởi tạo...";
const MSG_DOWNLOADING: &str = "Đang tải xuống...";
const MSG_RETRYING: &str = "Đang thử lại với phương án dự phòng...";
const MSG_FINAL_ATTEMPT: &str = "Đang thử lần cuối...";
const MSG_PROCESSING: &str = "Đang xử lý file...";
const MSG_PREPARING: &str = "Đang chuẩn bị file...";
const MSG_COMPLETE: &str = "Hoàn tất!";

const PERCENT_PROCESSING: u8 = 90;
const PERCENT_PREPARING: u8 = 95;

/// Percent sub-range `(floor, ceiling)` a tier's progress is mapped into
pub fn progress_window(tier: TierKind) -> (u8, u8) {
    match tier {
        TierKind::Primary => (30, 85),
        TierKind::Fallback => (50, 75),
        TierKind::LastResort => (80, 100),
    }
}

/// `clamp(floor + downloaded/total * (ceiling - floor), floor, ceiling)`
pub fn map_percent(window: (u8, u8), event: ProgressEvent) -> u8 {
    let (floor, ceiling) = window;
    let span = f64::from(ceiling.saturating_sub(floor));
    let mapped = f64::from(floor) + event.ratio() * span;
    (mapped.floor() as u8).clamp(floor, ceiling)
}

fn tier_status(tier: TierKind) -> (ProgressStatus, &'static str) {
    match tier {
        TierKind::Primary => (ProgressStatus::Downloading, MSG_DOWNLOADING),
        TierKind::Fallback => (ProgressStatus::Retrying, MSG_RETRYING),
        TierKind::LastResort => (ProgressStatus::FinalAttempt, MSG_FINAL_ATTEMPT),
    }
}

/// Why one tier did not produce output. Never surfaced mid-job.
#[derive(Debug, Clone)]
pub struct TierFailure {
    pub diagnostic: String,
    pub reason: BlockingReason,
}

impl TierFailure {
    fn from_stderr(stderr: &str) -> Self {
        Self {
            diagnostic: stderr.to_string(),
            reason: diagnose(stderr),
        }
    }

    fn from_error(err: &DownloadError) -> Self {
        Self::from_stderr(&err.to_string())
    }
}

/// Result of one tier attempt
#[derive(Debug)]
enum TierOutcome {
    Succeeded,
    Failed(TierFailure),
    Cancelled,
}

/// Publishes a job's progress, never letting the percent go backwards.
struct Reporter<'a> {
    store: &'a dyn ProgressStore,
    job_id: &'a str,
    last: u8,
}

impl<'a> Reporter<'a> {
    fn new(store: &'a dyn ProgressStore, job_id: &'a str) -> Self {
        Self {
            store,
            job_id,
            last: 0,
        }
    }

    fn publish(&mut self, percent: u8, status: ProgressStatus, message: &str) {
        self.last = self.last.max(percent.min(100));
        self.store
            .put(self.job_id, ProgressEntry::new(self.last, status, message));
    }

    /// Error freezes the percent at its last published value
    fn fail(&mut self, failure: &JobFailure) {
        self.store.put(
            self.job_id,
            ProgressEntry::new(self.last, ProgressStatus::Error, failure.message.clone()),
        );
    }
}

/// Drives one job through the strategy ladder
pub struct JobRunner {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ProgressStore>,
    classifier: UrlClassifier,
    attempt_timeout: Duration,
    proxy: Option<String>,
    cookies_path: Option<PathBuf>,
}

impl JobRunner {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            fetcher,
            store,
            classifier: UrlClassifier::default(),
            attempt_timeout: Duration::from_secs(600),
            proxy: None,
            cookies_path: None,
        }
    }

    pub fn with_classifier(mut self, classifier: UrlClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Wall-clock budget for each tier attempt
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    /// Run `job`, writing output into `output_dir`.
    ///
    /// Progress is published under `job.job_id` throughout; the terminal entry
    /// is either `complete` at 100 or `error` at the last published percent.
    pub async fn run(
        &self,
        job: &Job,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Artifact, JobFailure> {
        let mut reporter = Reporter::new(self.store.as_ref(), &job.job_id);
        reporter.publish(0, ProgressStatus::Starting, MSG_STARTING);

        let result = self.drive(job, output_dir, cancel, &mut reporter).await;
        match &result {
            Ok(artifact) => {
                reporter.publish(100, ProgressStatus::Complete, MSG_COMPLETE);
                tracing::info!(
                    job_id = %job.job_id,
                    tier = %artifact.tier,
                    bytes = artifact.byte_size,
                    name = %artifact.display_name,
                    "job complete"
                );
            }
            Err(failure) => {
                reporter.fail(failure);
                tracing::warn!(job_id = %job.job_id, kind = %failure.kind, "job failed: {}", failure.message);
            }
        }
        result
    }

    async fn drive(
        &self,
        job: &Job,
        output_dir: &Path,
        cancel: &CancellationToken,
        reporter: &mut Reporter<'_>,
    ) -> Result<Artifact, JobFailure> {
        let classification = self.classifier.classify(&job.locator);
        if !classification.valid {
            return Err(JobFailure::invalid_locator());
        }

        let builder = StrategyBuilder::new(output_dir)
            .with_proxy(self.proxy.clone())
            .with_cookies_path(self.cookies_path.clone());
        let mut ladder = builder.build(job.format, job.quality);
        if ladder.is_empty() {
            return Err(JobFailure::new(
                FailureKind::Internal,
                "Không có phương án tải xuống nào.",
            ));
        }
        if !ladder.iter().any(|s| s.tier == TierKind::LastResort) {
            ladder.push(builder.last_resort(job.format));
        }

        let mut rejected = false;
        let mut last_diagnostic = String::new();
        let mut produced_by = None;

        for strategy in &ladder {
            tracing::info!(
                job_id = %job.job_id,
                rank = strategy.rank,
                tier = %strategy.tier,
                selector = %strategy.selector,
                fetcher = self.fetcher.name(),
                "starting attempt"
            );
            if let Err(e) = clear_outputs(output_dir).await {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to clear output directory");
                return Err(JobFailure::internal(&e));
            }
            match self.attempt(strategy, &job.locator, cancel, reporter).await {
                TierOutcome::Succeeded => {
                    produced_by = Some(strategy.tier);
                    break;
                }
                TierOutcome::Failed(failure) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        rank = strategy.rank,
                        tier = %strategy.tier,
                        reason = failure.reason.description(),
                        "attempt failed: {}",
                        summarize_diagnostic(&failure.diagnostic)
                    );
                    rejected |= failure.reason.is_upstream_rejection();
                    last_diagnostic = failure.diagnostic;
                }
                TierOutcome::Cancelled => return Err(JobFailure::cancelled()),
            }
        }

        let Some(tier) = produced_by else {
            return Err(JobFailure::exhausted(rejected, &last_diagnostic));
        };

        reporter.publish(PERCENT_PROCESSING, ProgressStatus::Processing, MSG_PROCESSING);
        let (path, byte_size) = match locate_output(output_dir).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "no artifact after successful exit");
                return Err(JobFailure::empty_artifact());
            }
        };

        reporter.publish(PERCENT_PREPARING, ProgressStatus::Preparing, MSG_PREPARING);
        let title = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobFailure::cancelled()),
            probed = self.fetcher.probe_title(&job.locator) => probed,
        };
        let title = match title {
            Ok(title) => Some(title),
            Err(e) => {
                tracing::debug!(job_id = %job.job_id, error = %e, "title probe failed, using fallback name");
                None
            }
        };

        Ok(build_artifact(
            path,
            byte_size,
            job.format,
            tier,
            title.as_deref(),
            classification.resource_id.as_deref(),
        ))
    }

    /// One tier: launch, stream progress, wait for exit. Dropping the
    /// session on any early return kills the child.
    async fn attempt(
        &self,
        strategy: &Strategy,
        locator: &str,
        cancel: &CancellationToken,
        reporter: &mut Reporter<'_>,
    ) -> TierOutcome {
        let window = progress_window(strategy.tier);
        let (status, message) = tier_status(strategy.tier);
        let remap = strategy.tier != TierKind::LastResort;
        reporter.publish(window.0, status, message);

        if cancel.is_cancelled() {
            return TierOutcome::Cancelled;
        }

        let mut session = match self.fetcher.launch(strategy, locator).await {
            Ok(session) => session,
            Err(e) => return TierOutcome::Failed(TierFailure::from_error(&e)),
        };

        // An unrepresentable deadline means the attempt is never timed out
        let deadline = Instant::now().checked_add(self.attempt_timeout);
        let timed_out = || {
            TierOutcome::Failed(TierFailure::from_error(&DownloadError::Timeout(self.attempt_timeout)))
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return TierOutcome::Cancelled,
                _ = expire(deadline) => return timed_out(),
                event = session.next_event() => match event {
                    Some(event) if remap => reporter.publish(map_percent(window, event), status, message),
                    Some(_) => {}
                    None => break,
                },
            }
        }

        let exit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TierOutcome::Cancelled,
            _ = expire(deadline) => return timed_out(),
            exit = session.wait() => exit,
        };

        match exit {
            Ok(exit) if exit.success() => TierOutcome::Succeeded,
            Ok(exit) if exit.stderr.trim().is_empty() => TierOutcome::Failed(TierFailure::from_stderr(
                &format!("yt-dlp exited with {:?}", exit.code),
            )),
            Ok(exit) => TierOutcome::Failed(TierFailure::from_stderr(&exit.stderr)),
            Err(e) => TierOutcome::Failed(TierFailure::from_error(&e)),
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
