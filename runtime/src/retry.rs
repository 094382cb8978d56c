//! Exponential backoff for outbox redelivery.
//!
//! A record whose delivery fails is not retried in a loop on the spot: the relay
//! stores the time of the next attempt and moves on to the rest of the batch.
//! [`RedeliveryPolicy`] decides that time and when to give up.
//!
//! # Example
//!
//! ```rust
//! use borrowing_runtime::retry::{Redelivery, RedeliveryPolicy};
//! use std::time::Duration;
//!
//! let policy = RedeliveryPolicy::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! assert_eq!(policy.after_failure(1), Redelivery::RetryAfter(Duration::from_millis(100)));
//! assert_eq!(policy.after_failure(2), Redelivery::RetryAfter(Duration::from_millis(200)));
//! assert_eq!(policy.after_failure(3), Redelivery::GiveUp);
//! ```

use std::time::Duration;

/// Redelivery policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `initial_delay`: 1 second
/// - `max_delay`: 5 minutes
/// - `multiplier`: 2.0 (delay doubles each attempt)
#[derive(Debug, Clone, PartialEq)]
pub struct RedeliveryPolicy {
    /// Attempts (including the first) before a record is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Cap for the exponential delay.
    pub max_delay: Duration,
    /// Multiplier applied per additional failure.
    pub multiplier: f64,
}

/// What the relay should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    /// Try again after this delay.
    RetryAfter(Duration),
    /// Attempts are exhausted.
    GiveUp,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RedeliveryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RedeliveryPolicyBuilder {
        RedeliveryPolicyBuilder {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// `initial_delay * multiplier ^ retry`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// Decide what happens after the `failed_attempts`-th consecutive failure.
    #[must_use]
    pub fn after_failure(&self, failed_attempts: u32) -> Redelivery {
        if failed_attempts >= self.max_attempts {
            Redelivery::GiveUp
        } else {
            Redelivery::RetryAfter(self.delay_for_retry(failed_attempts.saturating_sub(1)))
        }
    }
}

/// Builder for [`RedeliveryPolicy`].
#[derive(Debug, Clone)]
pub struct RedeliveryPolicyBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RedeliveryPolicyBuilder {
    /// Set attempts before dead-lettering. Values below 1 are treated as 1.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    /// Set the delay after the first failure.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Build the [`RedeliveryPolicy`].
    #[must_use]
    pub const fn build(self) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}
