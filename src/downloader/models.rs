// Common data models for the download engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::strategy::TierKind;

/// Requested output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[serde(alias = "mp3")]
    Audio,
    #[serde(alias = "mp4")]
    Video,
}

impl MediaFormat {
    /// Accepts `audio`/`mp3` and `video`/`mp4`, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "audio" | "mp3" => Some(Self::Audio),
            "video" | "mp4" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/mpeg",
            Self::Video => "video/mp4",
        }
    }

    /// Container the pipeline converts to
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested quality; anything unrecognised means `Highest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Highest,
    Medium,
    Lowest,
}

impl QualityTier {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("medium") => Self::Medium,
            Some("lowest") => Self::Lowest,
            _ => Self::Highest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::Medium => "medium",
            Self::Lowest => "lowest",
        }
    }

    /// Video height ceiling in pixels, if any
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::Highest => None,
            Self::Medium => Some(720),
            Self::Lowest => Some(480),
        }
    }
}

/// One retrieval request
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub locator: String,
    pub format: MediaFormat,
    pub quality: QualityTier,
}

impl Job {
    /// Build a job, generating an id when the caller did not supply one.
    pub fn new(
        job_id: Option<String>,
        locator: impl Into<String>,
        format: MediaFormat,
        quality: QualityTier,
    ) -> Self {
        let job_id = job_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            job_id,
            locator: locator.into().trim().to_string(),
            format,
            quality,
        }
    }
}

/// Job lifecycle state as seen by pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Downloading,
    Retrying,
    FinalAttempt,
    Processing,
    Preparing,
    Complete,
    Error,
    Unknown,
}

/// Latest known state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub percent: u8,
    pub status: ProgressStatus,
    pub message: String,
}

impl ProgressEntry {
    pub fn new(percent: u8, status: ProgressStatus, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            status,
            message: message.into(),
        }
    }

    /// What a poll returns for an id the store does not know
    pub fn unknown() -> Self {
        Self::new(0, ProgressStatus::Unknown, "")
    }
}

/// One `<downloaded>/<total>` update from the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub downloaded: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// Fraction in [0, 1]; `total` is always positive for emitted events.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.downloaded as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Resolved output file ready to be served
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub byte_size: u64,
    pub content_type: &'static str,
    pub display_name: String,
    /// Tier whose attempt produced the file
    pub tier: TierKind,
}

impl Artifact {
    /// True when a fallback tier had to be used
    pub fn degraded(&self) -> bool {
        self.tier != TierKind::Primary
    }
}

/// Metadata returned by the info probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration: String,
    pub thumbnail: String,
}
