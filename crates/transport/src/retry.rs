// Reconnect policy
//
// Exponential backoff with jitter between connection attempts. The attempt
// counter is the number of consecutive failures and resets whenever a
// connection is established.

use std::time::Duration;

use rand::Rng;

/// # Example
///
/// ```
/// use bellsync_transport::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::exponential()
///     .with_initial_interval(Duration::from_secs(1))
///     .with_max_interval(Duration::from_secs(30))
///     .with_jitter(0.0);
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated; `None` retries forever
    pub max_attempts: Option<u32>,

    pub initial_interval: Duration,

    pub max_interval: Duration,

    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0); 0.2 means ±20%
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl ReconnectPolicy {
    /// Unlimited attempts, 1 s doubling up to 30 s, 20% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: None,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            backoff_coefficient: 2.0,
            jitter: 0.2,
        }
    }

    /// Same delay every time
    pub fn fixed(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Give up after the first failure
    pub fn never() -> Self {
        Self::fixed(Duration::ZERO, Some(0))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before reconnecting after `failures` consecutive failures
    /// (1-based)
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Whether another attempt is allowed after `failures` failures
    pub fn has_attempts_remaining(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_is_capped() {
        let policy = ReconnectPolicy::exponential().with_jitter(0.0);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ReconnectPolicy::exponential().with_jitter(0.5);
        for _ in 0..100 {
            let delay = policy.delay_for_attempt(2).as_secs_f64();
            assert!((1.0..=3.0).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_attempt_budget() {
        let unlimited = ReconnectPolicy::exponential();
        assert!(unlimited.has_attempts_remaining(10_000));

        let limited = ReconnectPolicy::fixed(Duration::from_millis(10), Some(2));
        assert!(limited.has_attempts_remaining(1));
        assert!(limited.has_attempts_remaining(2));
        assert!(!limited.has_attempts_remaining(3));

        assert!(!ReconnectPolicy::never().has_attempts_remaining(1));
    }
}
