//! Drowsiness Detector - Main Entry Point

use anyhow::Context;
use clap::Parser;
use edge_node::{detector::run_detector, init_logging, install_metrics, EdgeSettings, NodeArgs};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = NodeArgs::parse();
    init_logging(args.json_logs)?;

    info!("=== Drowsiness Detector v{} ===", env!("CARGO_PKG_VERSION"));

    let settings = EdgeSettings::load(args.config.as_deref()).context("Failed to load settings")?;
    install_metrics(&settings.metrics)?;

    run_detector(settings).await
}
