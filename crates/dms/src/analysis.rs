//! Motion samples and drowsy events

use std::time::{Duration, Instant};

/// Motion score of one frame pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Mean absolute pixel difference against the previous frame
    pub score: f64,
    /// Capture time of the newer frame
    pub at: Instant,
}

/// Sustained stillness detected on a device
#[derive(Debug, Clone, PartialEq)]
pub struct DrowsyEvent {
    /// Emitting device
    pub source: String,
    /// Running count of events emitted by this detector (1-based)
    pub sequence: u64,
    /// When the event fired
    pub at: Instant,
    /// Motion score of the frame pair that fired the event
    pub score: f64,
    /// How long the scene had been still
    pub still_for: Duration,
}
