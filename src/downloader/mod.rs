// Downloader module - tiered-fallback download engine

pub mod classifier;
pub mod diagnostics;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod strategy;
pub mod workspace;
pub mod ytdlp;

pub use classifier::{Classification, UrlClassifier};
pub use diagnostics::{diagnose, BlockingReason};
pub use errors::{DownloadError, FailureKind, JobFailure};
pub use fetcher::{FetchExit, FetchSession, Fetcher};
pub use models::{
    Artifact, Job, MediaFormat, ProgressEntry, ProgressEvent, ProgressStatus, QualityTier,
    VideoInfo,
};
pub use orchestrator::JobRunner;
pub use progress::{MemoryProgressStore, ProgressStore};
pub use strategy::{Strategy, StrategyBuilder, TierKind};
pub use workspace::{ScratchDir, ScratchRoot};
pub use ytdlp::YtDlpFetcher;
