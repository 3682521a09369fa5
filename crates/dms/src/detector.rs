//! Motion-stillness drowsiness detector

use camera_capture::LumaFrame;
use tracing::{debug, info, warn};

use crate::analysis::{DrowsyEvent, MotionSample};
use crate::state::{DetectorState, StillnessWindow};
use crate::{DmsConfig, DmsError};

/// Turns consecutive luma frames into at most one drowsy event per
/// unacknowledged stillness episode
pub struct MotionDetector {
    config: DmsConfig,
    previous: Option<LumaFrame>,
    state: DetectorState,
    events_emitted: u64,
    last_score: Option<f64>,
}

impl MotionDetector {
    /// Create a new detector with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            "Motion detector armed: threshold {:.2}, stillness {:.1}s",
            config.motion_threshold, config.drowsy_time_secs
        );
        Ok(Self {
            config,
            previous: None,
            state: DetectorState::default(),
            events_emitted: 0,
            last_score: None,
        })
    }

    /// Feed the next frame; the frame's capture time is "now"
    pub fn observe(&mut self, frame: LumaFrame) -> Option<DrowsyEvent> {
        let sample = match &self.previous {
            None => None,
            Some(previous) => match frame.mean_abs_diff(previous) {
                Some(score) => Some(MotionSample {
                    score,
                    at: frame.captured_at(),
                }),
                None => {
                    warn!(
                        "Frame {} size {}x{} differs from previous {}x{}, restarting comparison",
                        frame.sequence(),
                        frame.width(),
                        frame.height(),
                        previous.width(),
                        previous.height()
                    );
                    None
                }
            },
        };
        self.previous = Some(frame);

        let sample = sample?;
        self.last_score = Some(sample.score);

        let (next, fired) = self.state.advance(&sample, &self.config);
        let still_for = match self.state.stillness {
            StillnessWindow::StillSince(start) => sample.at.saturating_duration_since(start),
            StillnessWindow::Unset => Default::default(),
        };
        self.state = next;

        if !fired {
            return None;
        }

        self.events_emitted += 1;
        info!(
            "Drowsiness detected (#{}): still for {:.1}s, score {:.2}",
            self.events_emitted,
            still_for.as_secs_f64(),
            sample.score
        );

        Some(DrowsyEvent {
            source: self.config.device_id.clone(),
            sequence: self.events_emitted,
            at: sample.at,
            score: sample.score,
            still_for,
        })
    }

    /// External acknowledgement: clears the stillness timer and re-arms the latch
    pub fn acknowledge(&mut self) {
        debug!("Acknowledged in state {:?}", self.state);
        self.state = self.state.acknowledged();
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Total drowsy events emitted since start
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted
    }

    /// Most recent motion score
    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::{Duration, Instant};

    fn frame(value: u8, at: Instant) -> LumaFrame {
        LumaFrame::new(vec![value; 16], 4, 4, at, 0).unwrap()
    }

    fn secs(t0: Instant, s: f64) -> Instant {
        t0 + Duration::from_secs_f64(s)
    }

    fn detector() -> MotionDetector {
        MotionDetector::new(DmsConfig::default()).unwrap()
    }

    /// Feed frames whose consecutive scores are `scores`, one per second.
    /// Returns the indices (into `scores`) that fired an event.
    fn run_scores(detector: &mut MotionDetector, t0: Instant, scores: &[u8]) -> Vec<usize> {
        let mut value = 0u8;
        assert!(detector.observe(frame(value, t0)).is_none());
        let mut fired = Vec::new();
        for (i, score) in scores.iter().enumerate() {
            value = value.wrapping_add(*score);
            if detector
                .observe(frame(value, secs(t0, (i + 1) as f64)))
                .is_some()
            {
                fired.push(i);
            }
        }
        fired
    }

    #[test]
    fn test_first_frame_emits_nothing() {
        let mut detector = detector();
        assert!(detector.observe(frame(0, Instant::now())).is_none());
        assert!(detector.last_score().is_none());
        assert_eq!(detector.state(), DetectorState::default());
    }

    #[test]
    fn test_single_event_after_three_seconds_of_stillness() {
        let mut detector = detector();
        let t0 = Instant::now();

        // stillness starts with the first 5 (t=2); 3s later (t=5) it fires
        let fired = run_scores(&mut detector, t0, &[15, 5, 5, 5, 5]);
        assert_eq!(fired, vec![4]);
        assert_eq!(detector.events_emitted(), 1);
        assert_eq!(detector.last_score(), Some(5.0));
    }

    #[test]
    fn test_no_event_before_drowsy_time() {
        let mut detector = detector();
        let fired = run_scores(&mut detector, Instant::now(), &[15, 5, 5, 5]);
        assert!(fired.is_empty());
        assert!(matches!(
            detector.state().stillness,
            StillnessWindow::StillSince(_)
        ));
    }

    #[test]
    fn test_at_most_one_event_per_episode() {
        let mut detector = detector();
        let fired = run_scores(&mut detector, Instant::now(), &[0; 20]);
        assert_eq!(fired, vec![3]);
        assert!(detector.state().alarm_sent);
    }

    #[test]
    fn test_motion_alone_does_not_rearm() {
        let mut detector = detector();
        // fires at index 3, motion at 4, long stillness afterwards
        let fired = run_scores(&mut detector, Instant::now(), &[0, 0, 0, 0, 40, 0, 0, 0, 0, 0]);
        assert_eq!(fired, vec![3]);
    }

    #[test]
    fn test_ack_rearms_detection() {
        let mut detector = detector();
        let t0 = Instant::now();
        let mut value = 0u8;
        detector.observe(frame(value, t0));

        let mut events = 0;
        for i in 1..=4 {
            if detector.observe(frame(value, secs(t0, i as f64))).is_some() {
                events += 1;
            }
        }
        assert_eq!(events, 1);

        detector.acknowledge();
        assert_eq!(detector.state(), DetectorState::default());

        // still frames keep coming: the timer restarts at t=5 and fires at t=8
        for i in 5..=8 {
            value = value.wrapping_add(1);
            let event = detector.observe(frame(value, secs(t0, i as f64)));
            if i == 8 {
                let event = event.unwrap();
                assert_eq!(event.sequence, 2);
                assert_eq!(event.still_for, Duration::from_secs(3));
                assert_eq!(event.source, "detector");
            } else {
                assert!(event.is_none());
            }
        }
    }

    #[test]
    fn test_size_change_restarts_comparison() {
        let mut detector = detector();
        let t0 = Instant::now();
        detector.observe(frame(0, t0));
        let other = LumaFrame::new(vec![0; 8], 2, 4, secs(t0, 1.0), 1).unwrap();
        assert!(detector.observe(other).is_none());
        assert!(detector.last_score().is_none());
    }

    proptest! {
        #[test]
        fn prop_motion_resets_stillness(
            stills in 0usize..10,
            jump in 10u8..=200,
        ) {
            let mut detector = detector();
            let t0 = Instant::now();
            let mut value = 50u8;
            detector.observe(frame(value, t0));
            for i in 0..stills {
                detector.observe(frame(value, secs(t0, (i + 1) as f64 * 0.5)));
            }
            value = value.wrapping_add(jump);
            detector.observe(frame(value, secs(t0, 100.0)));
            prop_assert_eq!(detector.state().stillness, StillnessWindow::Unset);
        }
    }
}
