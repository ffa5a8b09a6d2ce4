//! Reconnection Strategy
//!
//! Sessions never reconnect on their own. A caller opts in with
//! `ReconnectStrategy::Backoff`, which retries transport failures after an
//! exponentially growing, jittered delay.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Check the parameters make sense together.
    ///
    /// # Errors
    ///
    /// Returns `ReconnectError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<(), ReconnectError> {
        if self.initial_delay.is_zero() {
            return Err(ReconnectError::InvalidConfig(
                "initial delay must be positive".to_string(),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ReconnectError::InvalidConfig(format!(
                "initial delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ReconnectError::InvalidConfig(format!(
                "multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ReconnectError::InvalidConfig(format!(
                "jitter factor must be in [0, 1), got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }
}

/// When a closed session should be started again.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReconnectStrategy {
    /// Close is final.
    #[default]
    Never,
    /// Retry transport failures with exponential backoff.
    Backoff(ReconnectConfig),
}

impl ReconnectStrategy {
    /// Fresh policy for a session run, if reconnecting is enabled.
    #[must_use]
    pub fn policy(&self) -> Option<ReconnectPolicy> {
        match self {
            Self::Never => None,
            Self::Backoff(config) => Some(ReconnectPolicy::new(config.clone())),
        }
    }
}

/// Attempt counter and delay schedule for one session run.
///
/// # Example
///
/// ```rust
/// use dhan_feed::infrastructure::dhan::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert!(policy.next_delay().is_some());
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts run out.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        let delay = self.base_delay(self.attempt_count);
        self.attempt_count += 1;
        Some(self.apply_jitter(delay))
    }

    /// Start over after a connection that reached streaming.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    // initial * multiplier^attempt, capped at max_delay.
    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.powi(exponent);
        let scaled = self.config.initial_delay.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.config.max_delay.as_secs_f64() {
            return self.config.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let base = delay.as_secs_f64();
        let spread = base * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((base + jitter).max(0.001))
    }
}

/// Errors from reconnect configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    /// Parameters are inconsistent.
    #[error("invalid reconnect config: {0}")]
    InvalidConfig(String),
}
