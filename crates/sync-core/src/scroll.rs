use std::time::{Duration, Instant};

use crate::types::ScrollMetrics;

impl ScrollMetrics {
    /// Distance of the viewport top from the top of the content.
    pub fn distance_from_top(&self) -> f32 {
        self.scroll_top.max(0.0)
    }

    /// Whether the content overflows the viewport at all.
    pub fn is_scrollable(&self) -> bool {
        self.content_height > self.viewport_height
    }
}

/// Detects when the viewport nears the top of the loaded range.
///
/// The detector only signals intent; it never fetches. A cooldown window
/// throttles repeated triggers from a single scroll gesture, and the
/// cursor manager's in-flight guard absorbs anything that still gets
/// through while a fetch is pending.
#[derive(Debug, Clone)]
pub struct ScrollProximityDetector {
    threshold: f32,
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

impl ScrollProximityDetector {
    /// Create a detector with a top-proximity threshold (scroll units) and
    /// a trigger cooldown.
    pub fn new(threshold: f32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(0.0),
            cooldown,
            last_trigger: None,
        }
    }

    /// Feed one scroll sample. Returns `true` when older history should be
    /// requested.
    pub fn observe(&mut self, metrics: ScrollMetrics, now: Instant) -> bool {
        if !metrics.is_scrollable() {
            return false;
        }
        if metrics.distance_from_top() > self.threshold {
            return false;
        }
        if let Some(last) = self.last_trigger
            && now.duration_since(last) < self.cooldown
        {
            return false;
        }

        self.last_trigger = Some(now);
        true
    }

    /// Forget the cooldown state, e.g. when the view is replaced.
    pub fn reset(&mut self) {
        self.last_trigger = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_millis(750);

    fn near_top() -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: 40.0,
            viewport_height: 600.0,
            content_height: 2_400.0,
        }
    }

    #[test]
    fn triggers_near_the_top() {
        let mut detector = ScrollProximityDetector::new(100.0, COOLDOWN);
        assert!(detector.observe(near_top(), Instant::now()));
    }

    #[test]
    fn ignores_positions_beyond_the_threshold() {
        let mut detector = ScrollProximityDetector::new(100.0, COOLDOWN);
        let metrics = ScrollMetrics {
            scroll_top: 400.0,
            ..near_top()
        };
        assert!(!detector.observe(metrics, Instant::now()));
    }

    #[test]
    fn ignores_content_that_fits_the_viewport() {
        let mut detector = ScrollProximityDetector::new(100.0, COOLDOWN);
        let metrics = ScrollMetrics {
            scroll_top: 0.0,
            viewport_height: 600.0,
            content_height: 400.0,
        };
        assert!(!detector.observe(metrics, Instant::now()));
    }

    #[test]
    fn cooldown_absorbs_repeated_triggers_from_one_gesture() {
        let mut detector = ScrollProximityDetector::new(100.0, COOLDOWN);
        let start = Instant::now();

        assert!(detector.observe(near_top(), start));
        assert!(!detector.observe(near_top(), start + Duration::from_millis(50)));
        assert!(!detector.observe(near_top(), start + Duration::from_millis(700)));
        assert!(detector.observe(near_top(), start + Duration::from_millis(800)));
    }

    #[test]
    fn reset_allows_an_immediate_trigger() {
        let mut detector = ScrollProximityDetector::new(100.0, COOLDOWN);
        let start = Instant::now();

        assert!(detector.observe(near_top(), start));
        detector.reset();
        assert!(detector.observe(near_top(), start + Duration::from_millis(1)));
    }
}
