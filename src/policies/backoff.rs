//! # Backoff for automatic restarts.
//!
//! [`BackoffPolicy`] maps the number of restarts already performed to the delay
//! before the next one: `first × factor^n`, clamped to `max`, then jittered.
//!
//! With the default `factor = 1.0` the delay is fixed: every restart waits exactly
//! `first` (the process's `restart_delay`). The base delay is derived from the
//! restart number alone, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(4),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(500));
//! assert_eq!(backoff.next(2), Duration::from_secs(2));
//! assert_eq!(backoff.next(5), Duration::from_secs(4));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart delay policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth per restart (`1.0` = fixed delay).
    pub factor: f64,
    /// Optional randomization.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 1s delay, 30s cap, no jitter.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl BackoffPolicy {
    /// Constant delay, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay.max(Duration::from_secs(30)),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Exponential delay starting at `first`, growing by `factor`, capped at `max`.
    pub fn exponential(first: Duration, factor: f64, max: Duration) -> Self {
        Self {
            first,
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before restart number `restarts + 1`.
    ///
    /// `restarts` is the number of automatic restarts already performed since the
    /// last counter reset (0 for the first restart).
    pub fn next(&self, restarts: u32) -> Duration {
        self.jitter.apply(self.base(restarts))
    }

    /// Delay before jitter.
    pub fn base(&self, restarts: u32) -> Duration {
        if self.factor == 1.0 {
            return self.first.min(self.max);
        }
        let exp = restarts.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
