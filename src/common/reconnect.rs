//! Attempt-based linear backoff.
//!
//! Delays grow by a fixed step per attempt and stop growing at a cap:
//! `min(attempt * step, max)`.

use std::time::Duration;

use backon::BackoffBuilder;

/// Step and cap for a linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoffConfig {
    pub step: Duration,
    pub max_delay: Duration,
}

impl LinearBackoffConfig {
    pub const fn new(step: Duration, max_delay: Duration) -> Self {
        Self { step, max_delay }
    }

    /// Delay for the given 1-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt.max(1)).min(self.max_delay)
    }
}

/// Backoff for reconnecting: 5s per attempt, 5 minutes max.
pub const RECONNECT_BACKOFF: LinearBackoffConfig =
    LinearBackoffConfig::new(Duration::from_secs(5), Duration::from_secs(300));

/// Backoff for linking to the guild: 5s per attempt, 5 minutes max.
pub const LINK_BACKOFF: LinearBackoffConfig =
    LinearBackoffConfig::new(Duration::from_secs(5), Duration::from_secs(300));

/// Abort timer for a connection attempt that never spawns: 60s per attempt, 5 minutes max.
pub const CONNECT_ABORT_BACKOFF: LinearBackoffConfig =
    LinearBackoffConfig::new(Duration::from_secs(60), Duration::from_secs(300));

/// Unlimited linear backoff iterator, usable with `backon`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    config: LinearBackoffConfig,
    attempts: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        Some(self.config.delay_for(self.attempts))
    }
}

impl BackoffBuilder for LinearBackoffConfig {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            config: self,
            attempts: 0,
        }
    }
}

/// Tracks consecutive attempts and derives delays from them.
#[derive(Debug)]
pub struct AttemptCounter {
    config: LinearBackoffConfig,
    attempts: u32,
}

impl AttemptCounter {
    pub fn new(config: LinearBackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record a new attempt and return its number.
    pub fn increment(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Delay for the current attempt count.
    pub fn current_delay(&self) -> Duration {
        self.config.delay_for(self.attempts)
    }

    /// Reset state after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays_are_capped() {
        let delays: Vec<_> = LINK_BACKOFF.build().take(3).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(15)
            ]
        );
        assert_eq!(LINK_BACKOFF.delay_for(1000), Duration::from_secs(300));
    }

    #[test]
    fn test_abort_timer_delays() {
        assert_eq!(CONNECT_ABORT_BACKOFF.delay_for(1), Duration::from_secs(60));
        assert_eq!(CONNECT_ABORT_BACKOFF.delay_for(4), Duration::from_secs(240));
        assert_eq!(CONNECT_ABORT_BACKOFF.delay_for(6), Duration::from_secs(300));
    }

    #[test]
    fn test_attempt_counter_reset() {
        let mut counter = AttemptCounter::new(RECONNECT_BACKOFF);
        counter.increment();
        counter.increment();
        assert_eq!(counter.attempts(), 2);
        assert_eq!(counter.current_delay(), Duration::from_secs(10));
        counter.reset();
        assert_eq!(counter.attempts(), 0);
        // Attempt zero still waits one step.
        assert_eq!(counter.current_delay(), Duration::from_secs(5));
    }
}
