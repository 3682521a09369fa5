//! Drowsiness Gateway - Main Entry Point
//!
//! Boards that reset on open need a longer `serial.settle_ms` here than on
//! the detector (4000 is typical).

use anyhow::Context;
use clap::Parser;
use edge_node::{gateway::run_gateway, init_logging, install_metrics, EdgeSettings, NodeArgs};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = NodeArgs::parse();
    init_logging(args.json_logs)?;

    info!("=== Drowsiness Gateway v{} ===", env!("CARGO_PKG_VERSION"));

    let settings = EdgeSettings::load(args.config.as_deref()).context("Failed to load settings")?;
    install_metrics(&settings.metrics)?;

    run_gateway(settings).await
}
