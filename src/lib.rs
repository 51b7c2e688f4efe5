pub mod config;
pub mod downloader;
pub mod logging;
pub mod server;

use std::sync::Arc;
use tokio::net::TcpListener;

use config::ServiceConfig;
use downloader::{JobRunner, MemoryProgressStore, ScratchRoot, UrlClassifier, YtDlpFetcher};
use server::AppState;

/// Wire up the engine from `config`.
pub fn build_state(config: &ServiceConfig) -> AppState {
    let fetcher = YtDlpFetcher::new(config.ytdlp_path.clone(), config.probe_timeout)
        .with_proxy(config.proxy.clone())
        .with_cookies_path(config.cookies_path.clone());
    tracing::info!(binary = %fetcher.binary(), "using yt-dlp");

    let store = MemoryProgressStore::new(config.progress_capacity, config.progress_ttl);
    let classifier = UrlClassifier::new(
        config.primary_domains.clone(),
        config.short_domains.clone(),
    );

    let runner = JobRunner::new(Arc::new(fetcher), Arc::new(store))
        .with_classifier(classifier)
        .with_attempt_timeout(config.attempt_timeout)
        .with_proxy(config.proxy.clone())
        .with_cookies_path(config.cookies_path.clone());

    AppState::new(Arc::new(runner), ScratchRoot::new(config.scratch_root.clone()))
}

/// Sweep stale scratch directories, then serve until Ctrl-C.
pub async fn run(config: ServiceConfig) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.scratch_root).await?;
    let scratch = ScratchRoot::new(config.scratch_root.clone());
    if let Err(e) = scratch.sweep_stale(config.stale_max_age).await {
        tracing::warn!(error = %e, "stale scratch sweep failed");
    }

    let app = server::router(build_state(&config));
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}
