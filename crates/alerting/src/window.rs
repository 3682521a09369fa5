//! Time-bounded event window

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Arrival times of recent events, oldest first.
///
/// After `prune(now)` every retained instant `t` satisfies `now - t <= span`.
#[derive(Debug, Clone)]
pub struct EventWindow {
    events: VecDeque<Instant>,
    span: Duration,
}

impl EventWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            span,
        }
    }

    /// Append an event. Instants earlier than the newest retained one are
    /// recorded at the newest instant so the window stays ordered.
    pub fn push(&mut self, at: Instant) {
        let at = match self.events.back() {
            Some(&newest) if at < newest => newest,
            _ => at,
        };
        self.events.push_back(at);
    }

    /// Drop every event older than the span, relative to `now`
    pub fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) > self.span {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut window = EventWindow::new(Duration::from_secs(5));
        window.push(t0);
        window.prune(t0 + Duration::from_secs(5));
        assert_eq!(window.len(), 1);
        window.prune(t0 + Duration::from_millis(5001));
        assert!(window.is_empty());
    }

    #[test]
    fn test_out_of_order_push_stays_sorted() {
        let t0 = Instant::now();
        let mut window = EventWindow::new(Duration::from_secs(5));
        window.push(t0 + Duration::from_secs(2));
        window.push(t0);
        let retained: Vec<_> = window.iter().copied().collect();
        assert_eq!(retained, vec![t0 + Duration::from_secs(2); 2]);
    }

    proptest! {
        #[test]
        fn prop_prune_keeps_only_recent(
            mut offsets_ms in proptest::collection::vec(0u64..20_000, 1..50),
            span_ms in 1u64..10_000,
        ) {
            offsets_ms.sort_unstable();
            let t0 = Instant::now();
            let span = Duration::from_millis(span_ms);
            let mut window = EventWindow::new(span);

            for (i, offset) in offsets_ms.iter().enumerate() {
                let now = t0 + Duration::from_millis(*offset);
                window.push(now);
                window.prune(now);

                let expected = offsets_ms[..=i]
                    .iter()
                    .filter(|o| offset - **o <= span_ms)
                    .count();
                prop_assert_eq!(window.len(), expected);
                prop_assert!(window.iter().all(|t| now.duration_since(*t) <= span));
                prop_assert!(window.iter().zip(window.iter().skip(1)).all(|(a, b)| a <= b));
            }
        }
    }
}
