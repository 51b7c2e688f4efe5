// yt-dlp fetcher - launches the native binary and streams its progress

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::errors::DownloadError;
use super::fetcher::{parse_progress_line, FetchExit, FetchSession, Fetcher};
use super::models::VideoInfo;
use super::strategy::Strategy;

/// One `<downloaded>/<total>` line per update; falls back to the estimate for HLS/DASH
const PROGRESS_TEMPLATE: &str =
    "download:%(progress.downloaded_bytes)s/%(progress.total_bytes,progress.total_bytes_estimate)s";

const EVENT_BUFFER: usize = 64;

/// Fetcher backed by the `yt-dlp` binary
pub struct YtDlpFetcher {
    binary: String,
    probe_timeout: Duration,
    proxy: Option<String>,
    cookies_path: Option<PathBuf>,
}

impl YtDlpFetcher {
    /// `binary` of `None` means auto-detect
    pub fn new(binary: Option<String>, probe_timeout: Duration) -> Self {
        Self {
            binary: binary.unwrap_or_else(find_ytdlp),
            probe_timeout,
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

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for a full download attempt
    fn download_args(strategy: &Strategy, locator: &str) -> Vec<String> {
        let mut args = strategy.to_args();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--no-warnings".to_string(),
            locator.to_string(),
        ]);
        args
    }

    /// Arguments shared by metadata-only probes
    fn probe_args(&self, mode: &str, locator: &str) -> Vec<String> {
        let mut args = vec![
            mode.to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        if let Some(path) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        args.push(locator.to_string());
        args
    }

    async fn probe(&self, mode: &str, locator: &str) -> Result<Output, DownloadError> {
        let args = self.probe_args(mode, locator);
        let output = run_output_with_timeout(&self.binary, args, self.probe_timeout).await?;
        if !output.status.success() {
            return Err(DownloadError::ProcessFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn launch(&self, strategy: &Strategy, locator: &str) -> Result<FetchSession, DownloadError> {
        let args = Self::download_args(strategy, locator);
        tracing::debug!(binary = %self.binary, args = ?args, "launching yt-dlp");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Io(std::io::Error::other("failed to capture stdout")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Io(std::io::Error::other("failed to capture stderr")))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let exit = tokio::spawn(async move {
            let stderr_task = tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).to_string()
            });

            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = parse_progress_line(&line) {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                } else if line.contains("[Merger]") || line.contains("[ExtractAudio]") {
                    tracing::debug!(line = %line, "yt-dlp postprocessing");
                }
            }
            drop(tx);

            let status = child.wait().await.map_err(DownloadError::Io)?;
            let stderr = stderr_task.await.unwrap_or_default();
            Ok::<_, DownloadError>(FetchExit {
                code: status.code(),
                stderr,
            })
        });

        Ok(FetchSession::new(rx, exit))
    }

    async fn probe_title(&self, locator: &str) -> Result<String, DownloadError> {
        let output = self.probe("--get-title", locator).await?;
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DownloadError::Parse("empty title".to_string()))
    }

    async fn probe_info(&self, locator: &str) -> Result<VideoInfo, DownloadError> {
        let output = self.probe("--dump-json", locator).await?;
        parse_video_info(&output.stdout)
    }
}

/// Run a command to completion, killing it once `limit` elapses
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    limit: Duration,
) -> Result<Output, DownloadError> {
    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DownloadError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match timeout(limit, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        // Dropping the future drops the child, which kills it
        Err(_) => Err(DownloadError::Timeout(limit)),
    }
}

/// Parse `--dump-json` output
pub fn parse_video_info(stdout: &[u8]) -> Result<VideoInfo, DownloadError> {
    let json_str = String::from_utf8_lossy(stdout);
    let first = json_str.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let json: serde_json::Value = serde_json::from_str(first)
        .map_err(|e| DownloadError::Parse(format!("JSON parse error: {}", e)))?;

    let duration_secs = json["duration"].as_f64().unwrap_or(0.0) as i64;
    let minutes = duration_secs / 60;
    let seconds = duration_secs % 60;

    Ok(VideoInfo {
        id: json["id"].as_str().unwrap_or("").to_string(),
        title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
        uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        duration: format!("{}:{:02}", minutes, seconds),
        thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
    })
}

/// Find yt-dlp in common install paths, then PATH
pub fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac, pip --user installs
        "/usr/bin/yt-dlp",          // Distro package
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path;
            }
        }
    }

    "yt-dlp".to_string()
}
