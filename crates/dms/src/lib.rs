//! Driver Monitoring System (DMS)
//!
//! Drowsiness detection from a raw motion signal:
//! - Frame-to-frame mean absolute luma difference
//! - Stillness debounce timer
//! - One event per stillness episode, re-armed by acknowledgement

pub mod analysis;
pub mod config;
pub mod detector;
pub mod state;

pub use analysis::{DrowsyEvent, MotionSample};
pub use config::DmsConfig;
pub use detector::MotionDetector;
pub use state::{DetectorState, StillnessWindow};

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),
}
