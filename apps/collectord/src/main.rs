//! Standalone trace collector entry point.
//!
//! Usage: `pipetrace-collectord [config.toml]`

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting trace collector"
    );

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::Config::load(path.as_deref())?;
    tracing::info!(endpoint = %config.collector.endpoint, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("collector shut down cleanly");
    Ok(())
}
