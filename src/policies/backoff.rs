//! # Backoff policy for transient accept failures.
//!
//! [`BackoffPolicy`] controls how long the acceptor sleeps after consecutive
//! temporary `accept` errors. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failure;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the delay cap.
//!
//! The delay for failure `n` (0-indexed) is `first × factor^n`, clamped to `max`.
//! The caller owns the failure counter and resets it after any successful accept,
//! so the next failure starts again from `first`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use servisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::default();
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(5));
//! assert_eq!(backoff.next(1), Duration::from_millis(10));
//! // 5ms × 2^8 = 1280ms → capped at 1s
//! assert_eq!(backoff.next(8), Duration::from_secs(1));
//! ```

use std::time::Duration;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first consecutive failure.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns the accept-loop policy:
    /// - `first = 5ms`;
    /// - `factor = 2.0` (doubling);
    /// - `max = 1s`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(5),
            max: Duration::from_secs(1),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given consecutive failure (0-indexed).
    ///
    /// Non-finite or out-of-range intermediate values clamp to [`BackoffPolicy::max`],
    /// so the result never exceeds the cap.
    pub fn next(&self, failure: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failure.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
