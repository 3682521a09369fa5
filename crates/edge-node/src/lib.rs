//! Drowsiness Alert Edge Nodes
//!
//! Process wiring for the two roles:
//! - `detector`: camera, motion detector, serial alarm, event publishing
//! - `gateway`: bus subscriber, sliding-window aggregator, serial alarm

pub mod detector;
pub mod gateway;
pub mod settings;

pub use detector::DetectorNode;
pub use gateway::{Gateway, GatewayStep};
pub use settings::{EdgeSettings, MetricsConfig, SettingsError};

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line shared by both binaries
#[derive(Parser, Debug)]
#[command(version)]
pub struct NodeArgs {
    /// TOML settings file; `DROWSY__*` environment variables override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Start the Prometheus exporter when a listen address is configured
pub fn install_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    let Some(addr) = config.listen_addr else {
        return Ok(());
    };
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Metrics exposed on http://{}/metrics", addr);
    Ok(())
}
