// Shared fixtures: a scripted fetcher and a progress store that keeps history
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use tubegrab::downloader::fetcher::parse_progress_line;
use tubegrab::downloader::{
    DownloadError, FetchExit, FetchSession, Fetcher, JobRunner, MemoryProgressStore,
    ProgressEntry, ProgressStore, Strategy, VideoInfo,
};

pub const BOT_STDERR: &str = "[youtube] abc123: Downloading webpage\nERROR: [youtube] abc123: Sign in to confirm you're not a bot. Use --cookies-from-browser or --cookies for the authentication.";
pub const GENERIC_STDERR: &str = "ERROR: [youtube] abc123: Requested format is not available";

/// What one launch does
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Print `lines`, write `file` into the output directory, exit 0
    Succeed {
        lines: Vec<&'static str>,
        file: Option<(&'static str, &'static [u8])>,
    },
    /// Print `lines`, exit 1 with `stderr`
    Fail {
        lines: Vec<&'static str>,
        stderr: &'static str,
    },
    /// Write `file` into the output directory, then exit 1 with `stderr`
    FailLeaving {
        file: (&'static str, &'static [u8]),
        stderr: &'static str,
    },
    /// Never exits on its own
    Hang,
    /// Binary could not be started
    SpawnError,
}

impl Attempt {
    pub fn ok(name: &'static str, bytes: &'static [u8]) -> Self {
        Self::Succeed {
            lines: vec!["0/100", "50/100", "100/100"],
            file: Some((name, bytes)),
        }
    }

    pub fn rejected() -> Self {
        Self::Fail {
            lines: vec![],
            stderr: BOT_STDERR,
        }
    }

    pub fn failed() -> Self {
        Self::Fail {
            lines: vec![],
            stderr: GENERIC_STDERR,
        }
    }
}

pub struct ScriptedFetcher {
    attempts: Mutex<VecDeque<Attempt>>,
    launched: Mutex<Vec<Strategy>>,
    title: Option<String>,
}

impl ScriptedFetcher {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            launched: Mutex::new(Vec::new()),
            title: Some("My Song".to_string()),
        }
    }

    pub fn with_title(mut self, title: Option<&str>) -> Self {
        self.title = title.map(str::to_string);
        self
    }

    /// Strategies launched so far, in order
    pub fn launched(&self) -> Vec<Strategy> {
        self.launched.lock().unwrap().clone()
    }
}

async fn send_lines(tx: &mpsc::Sender<tubegrab::downloader::ProgressEvent>, lines: &[&str]) {
    for line in lines {
        if let Some(event) = parse_progress_line(line) {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn launch(&self, strategy: &Strategy, _locator: &str) -> Result<FetchSession, DownloadError> {
        self.launched.lock().unwrap().push(strategy.clone());
        let attempt = self
            .attempts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Attempt::SpawnError);
        let output_dir = Path::new(&strategy.output_template)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(16);
        let exit = match attempt {
            Attempt::SpawnError => {
                return Err(DownloadError::Spawn {
                    program: "yt-dlp".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                })
            }
            Attempt::Hang => tokio::spawn(async move {
                let _tx = tx;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, DownloadError>(FetchExit {
                    code: Some(0),
                    stderr: String::new(),
                })
            }),
            Attempt::Succeed { lines, file } => tokio::spawn(async move {
                send_lines(&tx, &lines).await;
                if let Some((name, bytes)) = file {
                    tokio::fs::write(output_dir.join(name), bytes)
                        .await
                        .map_err(DownloadError::Io)?;
                }
                drop(tx);
                Ok::<_, DownloadError>(FetchExit {
                    code: Some(0),
                    stderr: String::new(),
                })
            }),
            Attempt::FailLeaving {
                file: (name, bytes),
                stderr,
            } => tokio::spawn(async move {
                tokio::fs::write(output_dir.join(name), bytes)
                    .await
                    .map_err(DownloadError::Io)?;
                drop(tx);
                Ok::<_, DownloadError>(FetchExit {
                    code: Some(1),
                    stderr: stderr.to_string(),
                })
            }),
            Attempt::Fail { lines, stderr } => tokio::spawn(async move {
                send_lines(&tx, &lines).await;
                drop(tx);
                Ok::<_, DownloadError>(FetchExit {
                    code: Some(1),
                    stderr: stderr.to_string(),
                })
            }),
        };
        Ok(FetchSession::new(rx, exit))
    }

    async fn probe_title(&self, _locator: &str) -> Result<String, DownloadError> {
        self.title.clone().ok_or(DownloadError::ProcessFailed {
            code: Some(1),
            stderr: "ERROR: unable to extract title".to_string(),
        })
    }

    async fn probe_info(&self, _locator: &str) -> Result<VideoInfo, DownloadError> {
        let title = self.probe_title("").await?;
        Ok(VideoInfo {
            id: "abc123".to_string(),
            title,
            uploader: "Someone".to_string(),
            duration: "3:25".to_string(),
            thumbnail: String::new(),
        })
    }
}

/// Keeps every published entry in order
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryProgressStore,
    history: Mutex<Vec<(String, ProgressEntry)>>,
}

impl RecordingStore {
    pub fn history(&self, job_id: &str) -> Vec<ProgressEntry> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn percents(&self, job_id: &str) -> Vec<u8> {
        self.history(job_id).iter().map(|e| e.percent).collect()
    }
}

impl ProgressStore for RecordingStore {
    fn put(&self, job_id: &str, entry: ProgressEntry) {
        self.history
            .lock()
            .unwrap()
            .push((job_id.to_string(), entry.clone()));
        self.inner.put(job_id, entry);
    }

    fn get(&self, job_id: &str) -> Option<ProgressEntry> {
        self.inner.get(job_id)
    }
}

pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub store: Arc<RecordingStore>,
    pub runner: JobRunner,
}

pub fn harness(fetcher: ScriptedFetcher) -> Harness {
    let fetcher = Arc::new(fetcher);
    let store = Arc::new(RecordingStore::default());
    let runner = JobRunner::new(fetcher.clone(), store.clone())
        .with_attempt_timeout(Duration::from_secs(5));
    Harness {
        fetcher,
        store,
        runner,
    }
}
