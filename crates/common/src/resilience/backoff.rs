//! Jittered exponential backoff for reconnect loops.
//!
//! The base delay starts at a floor, doubles after every consecutive failure
//! and is capped at a ceiling. Symmetric jitter is added on top of the base so
//! that many instances restarting against the same broker do not reconnect in
//! lockstep. A successful dial resets the base to the floor.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// Jitter applied on top of a computed base delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Uniform offset in `[-spread, +spread)`, clamped so the result is never
    /// negative
    Symmetric(Duration),
}

impl Jitter {
    /// Apply jitter to the base delay
    #[must_use]
    pub fn apply(&self, base: Duration) -> Duration {
        match self {
            Jitter::None => base,
            Jitter::Symmetric(spread) => {
                let spread_ms = i64::try_from(spread.as_millis()).unwrap_or(i64::MAX);
                if spread_ms == 0 {
                    return base;
                }
                let offset = rand::thread_rng().gen_range(-spread_ms..spread_ms);
                let base_ms = i64::try_from(base.as_millis()).unwrap_or(i64::MAX);
                let jittered = base_ms.saturating_add(offset).max(0);
                Duration::from_millis(u64::try_from(jittered).unwrap_or(0))
            }
        }
    }
}

/// Configuration for [`ReconnectBackoff`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectBackoffConfig {
    /// First delay after a failure, and the value restored by `reset`
    pub floor: Duration,
    /// Upper bound for the base delay
    pub ceiling: Duration,
    /// Symmetric jitter spread
    pub jitter: Duration,
    /// Growth factor between consecutive failures
    pub multiplier: u32,
}

impl Default for ReconnectBackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl ReconnectBackoffConfig {
    /// Create a config from millisecond values as they appear in settings files
    #[must_use]
    pub fn from_millis(floor_ms: u64, ceiling_ms: u64, jitter_ms: u64) -> Self {
        Self {
            floor: Duration::from_millis(floor_ms),
            ceiling: Duration::from_millis(ceiling_ms),
            jitter: Duration::from_millis(jitter_ms),
            ..Self::default()
        }
    }

    /// Validate the schedule bounds
    pub fn validate(&self) -> CommonResult<()> {
        if self.floor.is_zero() {
            return Err(CommonError::config_field("floor", "must be greater than zero"));
        }
        if self.floor > self.ceiling {
            return Err(CommonError::config_field("ceiling", "must not be below the floor"));
        }
        if self.multiplier < 1 {
            return Err(CommonError::config_field("multiplier", "must be at least 1"));
        }
        Ok(())
    }
}

/// Reconnect delay schedule
///
/// ```
/// use std::time::Duration;
/// use channelog_common::resilience::{ReconnectBackoff, ReconnectBackoffConfig};
///
/// let mut backoff = ReconnectBackoff::new(ReconnectBackoffConfig::default());
/// assert_eq!(backoff.next_base_delay(), Duration::from_secs(1));
/// assert_eq!(backoff.next_base_delay(), Duration::from_secs(2));
/// backoff.reset();
/// assert_eq!(backoff.next_base_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: ReconnectBackoffConfig,
    jitter: Jitter,
    current: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    /// Create a schedule positioned at the floor
    #[must_use]
    pub fn new(config: ReconnectBackoffConfig) -> Self {
        let jitter = if config.jitter.is_zero() {
            Jitter::None
        } else {
            Jitter::Symmetric(config.jitter)
        };
        Self { config, jitter, current: config.floor, failures: 0 }
    }

    /// Base delay the next failure will produce, without advancing
    #[must_use]
    pub fn peek_base_delay(&self) -> Duration {
        self.current
    }

    /// Number of consecutive failures since the last reset
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return its base delay (no jitter)
    pub fn next_base_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(self.config.multiplier).min(self.config.ceiling);
        delay
    }

    /// Record a failure and return the jittered delay to sleep for
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base_delay();
        self.jitter.apply(base)
    }

    /// Return to the floor after a successful dial
    pub fn reset(&mut self) {
        self.current = self.config.floor;
        self.failures = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(ReconnectBackoffConfig::default())
    }
}
