//! Gateway alarm aggregator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::window::EventWindow;
use crate::AlertError;

/// Aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Sliding window length (seconds)
    pub window_secs: f64,
    /// Events inside the window needed to raise the alarm
    pub drowsy_threshold: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            drowsy_threshold: 3,
        }
    }
}

impl AggregatorConfig {
    /// Window length; saturates when out of range
    pub fn window(&self) -> Duration {
        Duration::try_from_secs_f64(self.window_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), AlertError> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(AlertError::Config(format!(
                "window_secs must be positive, got {}",
                self.window_secs
            )));
        }
        if Duration::try_from_secs_f64(self.window_secs).is_err() {
            return Err(AlertError::Config(format!(
                "window_secs is out of range, got {}",
                self.window_secs
            )));
        }
        if self.drowsy_threshold == 0 {
            return Err(AlertError::Config(
                "drowsy_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Gateway alarm state.
///
/// There is no standing "drowsy" state: the gateway goes from `Normal`
/// straight to `AlarmActive` once enough events land in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    #[default]
    Normal,
    AlarmActive,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Normal => f.write_str("NORMAL"),
            AlarmState::AlarmActive => f.write_str("ALARM_ACTIVE"),
        }
    }
}

/// Returned by [`Aggregator::on_event`] when the alarm must be raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmRaised {
    /// Events inside the window at the moment of transition
    pub events_in_window: usize,
}

/// Record produced when an active alarm is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    /// Unix seconds
    pub timestamp: i64,
}

/// Sliding-window alarm state machine.
///
/// `on_event` and `on_ack` are the only mutators; callers must serialize them.
pub struct Aggregator {
    config: AggregatorConfig,
    window: EventWindow,
    state: AlarmState,
    /// Number of NORMAL -> ALARM_ACTIVE transitions
    alarms_raised: u64,
    /// Number of ALARM_ACTIVE -> NORMAL transitions
    acknowledgements: u64,
}

impl Aggregator {
    /// Create a new aggregator
    pub fn new(config: AggregatorConfig) -> Self {
        info!(
            "Aggregator: {} events within {:.1}s raise the alarm",
            config.drowsy_threshold, config.window_secs
        );
        Self {
            window: EventWindow::new(config.window()),
            config,
            state: AlarmState::Normal,
            alarms_raised: 0,
            acknowledgements: 0,
        }
    }

    /// Record a drowsy event that arrived at `at`.
    ///
    /// Returns `Some` exactly when this event moves the state from `Normal`
    /// to `AlarmActive`; the caller then issues the alarm command.
    pub fn on_event(&mut self, at: Instant) -> Option<AlarmRaised> {
        self.window.push(at);
        self.window.prune(at);

        let events_in_window = self.window.len();
        info!("Drowsy events in window: {}", events_in_window);

        if self.state != AlarmState::Normal || events_in_window < self.config.drowsy_threshold {
            return None;
        }

        info!(
            "STATE CHANGE: {} -> {}",
            AlarmState::Normal,
            AlarmState::AlarmActive
        );
        self.state = AlarmState::AlarmActive;
        self.alarms_raised += 1;
        Some(AlarmRaised { events_in_window })
    }

    /// Handle an acknowledgement line.
    ///
    /// Only meaningful while `AlarmActive`: returns to `Normal`, empties the
    /// window and yields the ack record. A no-op otherwise.
    pub fn on_ack(&mut self, now: DateTime<Utc>) -> Option<AckRecord> {
        if self.state != AlarmState::AlarmActive {
            debug!("Ignoring ACK in state {}", self.state);
            return None;
        }

        info!(
            "STATE CHANGE: {} -> {} (acknowledged)",
            AlarmState::AlarmActive,
            AlarmState::Normal
        );
        self.state = AlarmState::Normal;
        self.window.clear();
        self.acknowledgements += 1;
        Some(AckRecord {
            timestamp: now.timestamp(),
        })
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Events currently retained in the window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window(&self) -> &EventWindow {
        &self.window
    }

    pub fn alarms_raised(&self) -> u64 {
        self.alarms_raised
    }

    pub fn acknowledgements(&self) -> u64 {
        self.acknowledgements
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}
