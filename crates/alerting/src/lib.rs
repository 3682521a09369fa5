//! Alerting System
//!
//! Correlates drowsy events from the detectors over a sliding time window
//! and holds the gateway alarm until it is acknowledged.

mod manager;
mod window;

pub use manager::{AckRecord, AggregatorConfig, AlarmRaised, AlarmState, Aggregator};
pub use window::EventWindow;

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Configuration error: {0}")]
    Config(String),
}
