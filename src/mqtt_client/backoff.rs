// SPDX-License-Identifier: MPL-2.0

use rand::Rng;
use std::time::Duration;

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 16_000;
const JITTER_MS: i64 = 500;

/// Reconnect delay generator.
///
/// Attempt `n` (0 based) waits `min(1s * 2^n, 16s)` plus a uniform jitter in
/// `[-500ms, 500ms)`, so the first delay lands in `[500ms, 1500ms)`.
#[derive(Debug, Default)]
pub struct ExponentialBackoff {
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(-JITTER_MS..JITTER_MS);
        let delay = Self::delay_for_attempt(self.attempts, jitter);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn delay_for_attempt(attempt: u32, jitter_ms: i64) -> Duration {
        // 2^5 already exceeds the cap
        let exponent = attempt.min(5);
        let midpoint = (BASE_DELAY_MS << exponent).min(MAX_DELAY_MS) as i64;
        Duration::from_millis((midpoint + jitter_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoints_double_and_cap() {
        let midpoints: Vec<u64> = (0..8)
            .map(|n| ExponentialBackoff::delay_for_attempt(n, 0).as_millis() as u64)
            .collect();
        assert_eq!(
            midpoints,
            vec![1000, 2000, 4000, 8000, 16000, 16000, 16000, 16000]
        );
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(
            ExponentialBackoff::delay_for_attempt(0, -500),
            Duration::from_millis(500)
        );
        assert_eq!(
            ExponentialBackoff::delay_for_attempt(4, 499),
            Duration::from_millis(16_499)
        );
    }

    #[test]
    fn test_sequence_ranges_and_reset() {
        let mut backoff = ExponentialBackoff::new();
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(500) && first < Duration::from_millis(1500));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(1500) && second < Duration::from_millis(2500));
        for _ in 0..10 {
            let d = backoff.next_delay();
            assert!(d >= Duration::from_millis(15_500) && d < Duration::from_millis(16_500));
        }

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        let again = backoff.next_delay();
        assert!(again < Duration::from_millis(1500));
    }
}
