//! Bumblebee Capture - Main Entry Point

use anyhow::Context;
use pipeline::{init_logging, run, PipelineConfig};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to install log subscriber")?;

    info!("=== Bumblebee Capture v{} ===", env!("CARGO_PKG_VERSION"));

    // Optional config file path as the only argument
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    info!("Mode: {:?}", config.acquisition.mode);

    if let Err(e) = run(config).await {
        error!("Startup failed ({}): {}", e.kind(), e);
        return Err(e.into());
    }
    Ok(())
}
