// Service configuration: CLI flags with environment fallbacks

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}: {1}")]
    Bind(String, std::net::AddrParseError),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no accepted host domains configured")]
    NoDomains,

    #[error("no cache directory available; set --scratch-root")]
    NoScratchRoot,
}

#[derive(Debug, Parser)]
#[command(name = "tubegrab")]
#[command(author, version, about = "Media download service with tiered yt-dlp fallback", long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "TUBEGRAB_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Path to the yt-dlp binary (auto-detected when omitted)
    #[arg(long, env = "TUBEGRAB_YTDLP")]
    pub ytdlp: Option<String>,

    /// Parent directory for per-job scratch directories
    #[arg(long, env = "TUBEGRAB_SCRATCH_ROOT")]
    pub scratch_root: Option<PathBuf>,

    /// Wall-clock limit per download attempt, in seconds
    #[arg(long, env = "TUBEGRAB_ATTEMPT_TIMEOUT", default_value_t = 600)]
    pub attempt_timeout: u64,

    /// Limit for metadata probes, in seconds
    #[arg(long, env = "TUBEGRAB_PROBE_TIMEOUT", default_value_t = 30)]
    pub probe_timeout: u64,

    /// Maximum number of progress entries kept
    #[arg(long, env = "TUBEGRAB_PROGRESS_CAPACITY", default_value_t = 10_000)]
    pub progress_capacity: u64,

    /// Seconds an untouched progress entry is kept
    #[arg(long, env = "TUBEGRAB_PROGRESS_TTL", default_value_t = 3600)]
    pub progress_ttl: u64,

    /// SOCKS5/HTTP proxy passed to yt-dlp
    #[arg(long, env = "TUBEGRAB_PROXY")]
    pub proxy: Option<String>,

    /// Netscape cookies file passed to yt-dlp
    #[arg(long, env = "TUBEGRAB_COOKIES")]
    pub cookies: Option<PathBuf>,

    /// Accepted primary domains (id in the `v` query parameter)
    #[arg(long, env = "TUBEGRAB_DOMAINS", value_delimiter = ',', default_value = "youtube.com")]
    pub domains: Vec<String>,

    /// Accepted short-link domains (id in the path)
    #[arg(long, env = "TUBEGRAB_SHORT_DOMAINS", value_delimiter = ',', default_value = "youtu.be")]
    pub short_domains: Vec<String>,

    /// Scratch directories older than this many seconds are removed at startup
    #[arg(long, env = "TUBEGRAB_STALE_MAX_AGE", default_value_t = 6 * 3600)]
    pub stale_max_age: u64,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub ytdlp_path: Option<String>,
    pub scratch_root: PathBuf,
    pub attempt_timeout: Duration,
    pub probe_timeout: Duration,
    pub progress_capacity: u64,
    pub progress_ttl: Duration,
    pub proxy: Option<String>,
    pub cookies_path: Option<PathBuf>,
    pub primary_domains: Vec<String>,
    pub short_domains: Vec<String>,
    pub stale_max_age: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            ytdlp_path: None,
            scratch_root: std::env::temp_dir().join("tubegrab"),
            attempt_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            progress_capacity: 10_000,
            progress_ttl: Duration::from_secs(3600),
            proxy: None,
            cookies_path: None,
            primary_domains: vec!["youtube.com".to_string()],
            short_domains: vec!["youtu.be".to_string()],
            stale_max_age: Duration::from_secs(6 * 3600),
        }
    }
}

impl ServiceConfig {
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
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

    pub fn with_domains(mut self, primary: Vec<String>, short: Vec<String>) -> Self {
        self.primary_domains = primary;
        self.short_domains = short;
        self
    }
}

impl TryFrom<Args> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let bind = args
            .bind
            .parse()
            .map_err(|e| ConfigError::Bind(args.bind.clone(), e))?;

        let scratch_root = match args.scratch_root {
            Some(root) => root,
            None => dirs::cache_dir()
                .map(|dir| dir.join("tubegrab"))
                .ok_or(ConfigError::NoScratchRoot)?,
        };

        for (name, value) in [
            ("attempt timeout", args.attempt_timeout),
            ("probe timeout", args.probe_timeout),
            ("progress capacity", args.progress_capacity),
            ("progress ttl", args.progress_ttl),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        let clean = |domains: Vec<String>| -> Vec<String> {
            domains
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect()
        };
        let primary_domains = clean(args.domains);
        let short_domains = clean(args.short_domains);
        if primary_domains.is_empty() && short_domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }

        Ok(Self {
            bind,
            ytdlp_path: args.ytdlp.filter(|p| !p.trim().is_empty()),
            scratch_root,
            attempt_timeout: Duration::from_secs(args.attempt_timeout),
            probe_timeout: Duration::from_secs(args.probe_timeout),
            progress_capacity: args.progress_capacity,
            progress_ttl: Duration::from_secs(args.progress_ttl),
            proxy: args.proxy.filter(|p| !p.trim().is_empty()),
            cookies_path: args.cookies,
            primary_domains,
            short_domains,
            stale_max_age: Duration::from_secs(args.stale_max_age),
        })
    }
}
