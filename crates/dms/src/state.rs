//! Stillness timer and alarm latch

use std::time::Instant;

use crate::analysis::MotionSample;
use crate::config::DmsConfig;

/// Stillness timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StillnessWindow {
    /// Motion active
    #[default]
    Unset,
    /// Scene has been still since the given instant
    StillSince(Instant),
}

/// Detector state carried from one frame to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectorState {
    pub stillness: StillnessWindow,
    /// Set once an event fired for the current episode; cleared only by an ack
    pub alarm_sent: bool,
}

impl DetectorState {
    /// Apply one motion sample. Returns the next state and whether a drowsy
    /// event fires on this sample.
    pub fn advance(self, sample: &MotionSample, config: &DmsConfig) -> (Self, bool) {
        if sample.score >= config.motion_threshold {
            // motion resumed; the latch stays as it is
            return (
                Self {
                    stillness: StillnessWindow::Unset,
                    ..self
                },
                false,
            );
        }

        match self.stillness {
            StillnessWindow::Unset => (
                Self {
                    stillness: StillnessWindow::StillSince(sample.at),
                    ..self
                },
                false,
            ),
            StillnessWindow::StillSince(start) => {
                let still_for = sample.at.saturating_duration_since(start);
                if still_for >= config.drowsy_time() && !self.alarm_sent {
                    (
                        Self {
                            alarm_sent: true,
                            ..self
                        },
                        true,
                    )
                } else {
                    (self, false)
                }
            }
        }
    }

    /// State after an external acknowledgement: timer cleared, latch re-armed
    pub fn acknowledged(self) -> Self {
        Self::default()
    }
}
