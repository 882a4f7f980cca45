//! How long the streamer waits before dialing the relay again.

use std::time::Duration;

use rand::Rng;

/// Exponential back-off between connection attempts.
///
/// The wait before attempt `n` (counting from 0) is
/// `initial_delay * multiplier^n`, capped at `max_delay`, then stretched by
/// a random share of up to `jitter` so a fleet of streamers restarted
/// together does not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction in `[0, 1]`; `0.25` adds up to a quarter of the delay.
    pub jitter: f64,
    /// Consecutive failed attempts tolerated; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
            max_attempts: None,
        }
    }
}

impl ReconnectBackoff {
    /// The same `delay` before every attempt, without jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let grown = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // f64::min discards NaN, so a degenerate product lands on the cap.
        let capped = grown.min(self.max_delay.as_secs_f64()).max(0.0);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let stretch = if jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64(capped * (1.0 + stretch))
    }

    /// Whether `failures` consecutive failed attempts use up the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_varies() {
        let p = ReconnectBackoff::fixed(Duration::from_millis(40));
        for attempt in [0, 1, 7, u32::MAX] {
            assert_eq!(p.delay_for_attempt(attempt), Duration::from_millis(40));
        }
    }

    #[test]
    fn delay_doubles_within_jitter_band() {
        let p = ReconnectBackoff::default();
        for (attempt, base_ms) in [(0, 500u64), (1, 1_000), (2, 2_000), (3, 4_000)] {
            let d = p.delay_for_attempt(attempt);
            assert!(d >= Duration::from_millis(base_ms), "{attempt}: {d:?}");
            assert!(d <= Duration::from_millis(base_ms * 5 / 4), "{attempt}: {d:?}");
        }
    }

    #[test]
    fn huge_attempt_counts_stay_at_cap() {
        let p = ReconnectBackoff {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(p.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn zero_initial_delay_is_immediate() {
        let p = ReconnectBackoff {
            initial_delay: Duration::ZERO,
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(p.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn attempt_budget() {
        let p = ReconnectBackoff::default().with_max_attempts(3);
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));
        assert!(!ReconnectBackoff::default().exhausted(u32::MAX));
    }
}
