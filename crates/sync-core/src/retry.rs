use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ResubscribeBackoff {
    base: Duration,
    max: Duration,
}

impl ResubscribeBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base: base.max(Duration::from_millis(1)),
            max,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 1_u32 << attempt.min(16);
        let scaled = self.base.saturating_mul(factor);
        scaled.max(hint.unwrap_or(Duration::ZERO)).min(self.max)
    }
}

impl Default for ResubscribeBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_waits_the_base_delay() {
        let backoff = ResubscribeBackoff::new(Duration::from_millis(250), Duration::from_secs(8));
        assert_eq!(
            backoff.delay_for_attempt(0, None),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn doubles_per_attempt_up_to_the_cap() {
        let backoff = ResubscribeBackoff::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(
            backoff.delay_for_attempt(3, None),
            Duration::from_millis(800)
        );
        assert_eq!(backoff.delay_for_attempt(30, None), Duration::from_secs(10));
    }

    #[test]
    fn honors_a_longer_server_hint() {
        let backoff = ResubscribeBackoff::default();
        assert_eq!(
            backoff.delay_for_attempt(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn clamps_a_zero_base_to_something_positive() {
        let backoff = ResubscribeBackoff::new(Duration::ZERO, Duration::from_secs(1));
        assert!(backoff.delay_for_attempt(0, None) > Duration::ZERO);
    }
}
