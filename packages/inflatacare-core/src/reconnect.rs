//! Reconnection Policy
//!
//! Delay schedule between connection attempts. The relay's cloud link uses a
//! fixed delay with no attempt cap; the dashboard push channel uses
//! exponential backoff with jitter, also uncapped.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.5 = ±50%).
    pub jitter_factor: f64,
    /// Maximum number of retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(5))
    }
}

impl ReconnectConfig {
    /// Same delay before every retry, forever.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Doubling delay from `initial` up to `max`, ±50% jitter, forever.
    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            multiplier: 2.0,
            jitter_factor: 0.5,
            max_attempts: 0,
        }
    }

    /// Whether the schedule never changes between attempts.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.jitter_factor <= 0.0
            && (self.multiplier <= 1.0 || self.initial_delay >= self.max_delay)
    }
}

/// Stateful delay schedule.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use inflatacare_core::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt.
    ///
    /// Returns `None` once `max_attempts` retries have been handed out.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay = self.apply_jitter(self.current_delay);

        let grown = self.current_delay.as_secs_f64() * self.config.multiplier.max(1.0);
        self.current_delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);

        Some(delay)
    }

    /// Start over after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Retries handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        let base = delay.as_secs_f64();
        let spread = base * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::try_from_secs_f64((base + offset).max(0.001)).unwrap_or(delay)
    }
}
