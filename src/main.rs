use anyhow::Context;
use clap::Parser;

use tubegrab::config::{Args, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tubegrab::logging::init_logging();

    let config = ServiceConfig::try_from(Args::parse()).context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    tubegrab::run(config).await.context("server error")
}
