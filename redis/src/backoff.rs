//! Jittered exponential backoff between lock acquisition attempts.
//!
//! Waiters that poll in lockstep hammer the lock store at the same instant the
//! holder releases. Each delay is therefore split into a fixed half and a random
//! half, and grows geometrically up to `max_delay`.

use rand::Rng;
use std::time::Duration;

/// Backoff schedule for blocking acquisition.
///
/// # Default Values
///
/// - `initial_delay`: 10ms
/// - `max_delay`: 200ms
/// - `multiplier`: 2.0
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap for the un-jittered delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the given bounds and the default multiplier.
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            ..Self::default()
        }
    }

    /// Un-jittered delay after `attempt` failed attempts (0-based), capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )] // Delays are small; float math is bounded by max_delay
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let max_millis = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64)
    }

    /// Delay to sleep after `attempt` failed attempts, in `[base/2, base]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Base delay is capped at max_delay
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_millis() as u64;
        let half = base / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        Duration::from_millis(base - half + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_grows_then_caps() {
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(100));

        assert_eq!(policy.base_delay(0), Duration::from_millis(10));
        assert_eq!(policy.base_delay(1), Duration::from_millis(20));
        assert_eq!(policy.base_delay(3), Duration::from_millis(80));
        assert_eq!(policy.base_delay(4), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1_000), Duration::from_millis(100));
    }

    #[test]
    fn jittered_delay_stays_within_half_and_full_base() {
        let policy = BackoffPolicy::default();
        for attempt in 0..8 {
            let base = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay <= base, "{delay:?} > {base:?}");
                assert!(delay >= base / 2, "{delay:?} < half of {base:?}");
            }
        }
    }

    #[test]
    fn max_delay_never_below_initial() {
        let policy = BackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(5));
        assert_eq!(policy.max_delay, Duration::from_millis(50));
        assert_eq!(policy.base_delay(3), Duration::from_millis(50));
    }
}
