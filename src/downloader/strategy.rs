// Strategy builder: ordered yt-dlp retrieval ladders
//
// Tier 0 asks for exactly what the caller wants, tier 1 relaxes the selector
// to a single pre-muxed file, tier 2 drops every constraint and option.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::models::{MediaFormat, QualityTier};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Position of a strategy in the fallback sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Primary,
    Fallback,
    LastResort,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::LastResort => "last_resort",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Robustness flags passed to yt-dlp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOptions {
    pub no_check_certificates: bool,
    pub user_agent: Option<String>,
    pub force_ipv4: bool,
    /// Seconds to sleep between downloads
    pub sleep_interval: Option<u32>,
    pub no_playlist: bool,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub skip_unavailable_fragments: bool,
    pub socket_timeout: Option<u32>,
    pub proxy: Option<String>,
    pub cookies_path: Option<PathBuf>,
}

impl StrategyOptions {
    /// Full set used by the primary and fallback tiers
    pub fn robust() -> Self {
        Self {
            no_check_certificates: true,
            user_agent: Some(USER_AGENT.to_string()),
            force_ipv4: true,
            sleep_interval: Some(1),
            no_playlist: true,
            retries: Some(5),
            fragment_retries: Some(10),
            skip_unavailable_fragments: true,
            socket_timeout: Some(30),
            proxy: None,
            cookies_path: None,
        }
    }

    /// Only playlist suppression; used by the last-resort tier
    pub fn minimal() -> Self {
        Self {
            no_check_certificates: false,
            user_agent: None,
            force_ipv4: false,
            sleep_interval: None,
            no_playlist: true,
            retries: None,
            fragment_retries: None,
            skip_unavailable_fragments: false,
            socket_timeout: None,
            proxy: None,
            cookies_path: None,
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        if self.no_playlist {
            args.push("--no-playlist".to_string());
        }
        if self.no_check_certificates {
            args.push("--no-check-certificates".to_string());
        }
        if let Some(ua) = &self.user_agent {
            args.push("--user-agent".to_string());
            args.push(ua.clone());
        }
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        if let Some(secs) = self.sleep_interval {
            args.push("--sleep-interval".to_string());
            args.push(secs.to_string());
        }
        if let Some(n) = self.retries {
            args.push("--retries".to_string());
            args.push(n.to_string());
        }
        if let Some(n) = self.fragment_retries {
            args.push("--fragment-retries".to_string());
            args.push(n.to_string());
        }
        if self.skip_unavailable_fragments {
            args.push("--skip-unavailable-fragments".to_string());
        }
        if let Some(secs) = self.socket_timeout {
            args.push("--socket-timeout".to_string());
            args.push(secs.to_string());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        if let Some(path) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }
    }
}

/// What happens after the streams are fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    /// `-x --audio-format <codec> [--audio-quality <n>]`
    ExtractAudio {
        codec: &'static str,
        quality: Option<u8>,
    },
    /// `--merge-output-format <c> [--recode-video <c>]`
    MergeVideo {
        container: &'static str,
        recode: bool,
    },
}

impl PostProcess {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::ExtractAudio { codec, quality } => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.to_string());
                if let Some(q) = quality {
                    args.push("--audio-quality".to_string());
                    args.push(q.to_string());
                }
            }
            Self::MergeVideo { container, recode } => {
                args.push("--merge-output-format".to_string());
                args.push(container.to_string());
                if *recode {
                    args.push("--recode-video".to_string());
                    args.push(container.to_string());
                }
            }
        }
    }
}

/// One retrieval attempt configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub rank: usize,
    pub tier: TierKind,
    pub selector: String,
    pub output_template: String,
    pub options: StrategyOptions,
    pub postprocess: PostProcess,
}

impl Strategy {
    /// yt-dlp arguments for this strategy, excluding progress flags and the URL
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.selector.clone(),
            "-o".to_string(),
            self.output_template.clone(),
        ];
        self.options.push_args(&mut args);
        self.postprocess.push_args(&mut args);
        args
    }
}

/// Maps `highest→0 (best)`, `medium→5`, `lowest→9 (worst)` on yt-dlp's VBR scale
pub fn audio_quality(quality: QualityTier) -> u8 {
    match quality {
        QualityTier::Highest => 0,
        QualityTier::Medium => 5,
        QualityTier::Lowest => 9,
    }
}

/// Builds the strategy ladder for one job. Pure.
#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    output_template: String,
    proxy: Option<String>,
    cookies_path: Option<PathBuf>,
}

impl StrategyBuilder {
    /// `output_dir` is the job's scratch directory
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_template: output_dir
                .join("download.%(ext)s")
                .to_string_lossy()
                .to_string(),
            proxy: None,
            cookies_path: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn build(&self, format: MediaFormat, quality: QualityTier) -> Vec<Strategy> {
        vec![
            self.primary(format, quality),
            self.fallback(format, quality),
            self.last_resort(format),
        ]
    }

    fn primary(&self, format: MediaFormat, quality: QualityTier) -> Strategy {
        let (selector, postprocess) = match format {
            MediaFormat::Audio => (
                "bestaudio/best".to_string(),
                PostProcess::ExtractAudio {
                    codec: "mp3",
                    quality: Some(audio_quality(quality)),
                },
            ),
            MediaFormat::Video => {
                let h = height_filter(quality);
                (
                    format!(
                        "bestvideo{h}[ext=mp4]+bestaudio[ext=m4a]/best{h}[ext=mp4]/best{h}/best"
                    ),
                    PostProcess::MergeVideo {
                        container: "mp4",
                        recode: true,
                    },
                )
            }
        };
        self.strategy(0, TierKind::Primary, selector, self.options(StrategyOptions::robust()), postprocess)
    }

    fn fallback(&self, format: MediaFormat, quality: QualityTier) -> Strategy {
        let (selector, postprocess) = match format {
            MediaFormat::Audio => (
                "bestaudio/best".to_string(),
                PostProcess::ExtractAudio {
                    codec: "mp3",
                    quality: None,
                },
            ),
            MediaFormat::Video => {
                let h = height_filter(quality);
                (
                    format!("best{h}[ext=mp4]/best{h}/best"),
                    PostProcess::MergeVideo {
                        container: "mp4",
                        recode: false,
                    },
                )
            }
        };
        self.strategy(1, TierKind::Fallback, selector, self.options(StrategyOptions::robust()), postprocess)
    }

    /// No quality constraint and minimal options
    pub fn last_resort(&self, format: MediaFormat) -> Strategy {
        let postprocess = match format {
            MediaFormat::Audio => PostProcess::ExtractAudio {
                codec: "mp3",
                quality: None,
            },
            MediaFormat::Video => PostProcess::MergeVideo {
                container: "mp4",
                recode: false,
            },
        };
        self.strategy(
            2,
            TierKind::LastResort,
            "best".to_string(),
            self.options(StrategyOptions::minimal()),
            postprocess,
        )
    }

    fn options(&self, mut options: StrategyOptions) -> StrategyOptions {
        options.proxy = self.proxy.clone();
        options.cookies_path = self.cookies_path.clone();
        options
    }

    fn strategy(
        &self,
        rank: usize,
        tier: TierKind,
        selector: String,
        options: StrategyOptions,
        postprocess: PostProcess,
    ) -> Strategy {
        Strategy {
            rank,
            tier,
            selector,
            output_template: self.output_template.clone(),
            options,
            postprocess,
        }
    }
}

fn height_filter(quality: QualityTier) -> String {
    quality
        .max_height()
        .map(|h| format!("[height<={}]", h))
        .unwrap_or_default()
}
