//! DMS configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::DmsError;

/// Motion-stillness detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Identifier carried on every drowsy event
    pub device_id: String,

    /// Mean absolute pixel difference below which a frame pair counts as still
    pub motion_threshold: f64,

    /// Continuous stillness required before a drowsy event (seconds)
    pub drowsy_time_secs: f64,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            device_id: "detector".to_string(),
            motion_threshold: 10.0,
            drowsy_time_secs: 3.0,
        }
    }
}

impl DmsConfig {
    /// Stillness debounce as a duration; saturates when out of range
    pub fn drowsy_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.drowsy_time_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), DmsError> {
        if !(self.motion_threshold.is_finite() && self.motion_threshold > 0.0) {
            return Err(DmsError::Config(format!(
                "motion_threshold must be positive, got {}",
                self.motion_threshold
            )));
        }
        if !(self.drowsy_time_secs.is_finite() && self.drowsy_time_secs > 0.0) {
            return Err(DmsError::Config(format!(
                "drowsy_time_secs must be positive, got {}",
                self.drowsy_time_secs
            )));
        }
        if Duration::try_from_secs_f64(self.drowsy_time_secs).is_err() {
            return Err(DmsError::Config(format!(
                "drowsy_time_secs is out of range, got {}",
                self.drowsy_time_secs
            )));
        }
        Ok(())
    }
}
