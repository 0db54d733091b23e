//! Exponential backoff with jitter for push reconnects
//!
//! `delay(n) = min(max, base * 2^min(n, max_exponent)) + jitter(0..jitter)`

use std::time::Duration;

use rand::Rng;

use super::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Pre-jitter delay for the given attempt number
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.config.max_exponent);
        self.config
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.config.max)
    }

    /// Advance the attempt counter and compute the sleep before the next retry
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.base_delay(self.attempt) + self.jitter()
    }

    /// Reset on successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn jitter(&self) -> Duration {
        let bound = self.config.jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..bound))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let backoff = Backoff::default();
        let expected_ms = [1_000, 2_000, 4_000, 8_000, 10_000];

        for (n, expected) in (1..=5).zip(expected_ms) {
            assert_eq!(backoff.base_delay(n), Duration::from_millis(expected), "attempt {n}");
        }

        for n in 6..=64 {
            assert_eq!(backoff.base_delay(n), Duration::from_millis(10_000), "attempt {n}");
        }
    }

    #[test]
    fn test_base_delay_monotonic() {
        let backoff = Backoff::default();
        let delays: Vec<_> = (0..20).map(|n| backoff.base_delay(n)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(delays[0], Duration::from_millis(500));
    }

    #[test]
    fn test_next_delay_jitter_bounds() {
        let mut backoff = Backoff::default();

        for n in 1..=8 {
            let delay = backoff.next_delay();
            let base = backoff.base_delay(n);
            assert_eq!(backoff.attempt(), n);
            assert!(delay >= base, "attempt {n}: {delay:?} < {base:?}");
            assert!(delay < base + Duration::from_millis(250), "attempt {n}: {delay:?}");
        }

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: Duration::ZERO,
            ..Default::default()
        });
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2_000));
    }
}
