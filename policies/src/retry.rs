//! Retry with configurable backoff for handling transient failures.
//!
//! A retry policy re-invokes the wrapped operation while its outcome matches
//! a retry predicate and attempts remain. The attempt index handed to the
//! backoff is one-based: the first retry after the first failure is attempt 1.
//!
//! `max_attempts` counts retries, not invocations: `max_attempts = 0` invokes
//! the operation exactly once and returns its outcome verbatim, and a
//! permanently failing operation under `max_attempts = N` is invoked `N + 1`
//! times before the last outcome is returned unmodified.
//!
//! # Example
//!
//! ```ignore
//! use failgate_policies::retry::{Backoff, RetryConfig};
//! use std::time::Duration;
//!
//! let policy = RetryConfig::builder()
//!     .max_attempts(2)
//!     .backoff(Backoff::Exponential {
//!         base: 2.0,
//!         cap: Duration::from_secs(30),
//!     })
//!     .build()
//!     .into_policy();
//! ```

use async_trait::async_trait;
use failgate_core::cancel::CancelToken;
use failgate_core::operation::Operation;
use failgate_core::outcome::{Outcome, OutcomePredicate, PolicyError, operation_failures};
use failgate_core::policy::Policy;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Delay function applied between attempts.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Equal delay before every retry
    Constant(Duration),
    /// `base ^ attempt` seconds, capped
    Exponential {
        /// Exponent base (e.g. 2.0 or 5.0)
        base: f64,
        /// Upper bound for the computed delay
        cap: Duration,
    },
    /// `base ^ attempt` seconds with full jitter: a uniform draw between
    /// zero and the computed delay, capped
    ExponentialJitter {
        /// Exponent base
        base: f64,
        /// Upper bound for the computed delay
        cap: Duration,
    },
}

impl Backoff {
    /// Delay before the given retry.
    ///
    /// `attempt` is one-based: the first retry after the first failure is
    /// attempt 1.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Constant(delay) => delay,
            Self::Exponential { base, cap } => exponential_delay(base, attempt, cap),
            Self::ExponentialJitter { base, cap } => {
                let full = exponential_delay(base, attempt, cap);
                let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
                full.mul_f64(factor)
            }
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn exponential_delay(base: f64, attempt: u32, cap: Duration) -> Duration {
    let seconds = base.powi(attempt as i32);
    // Compare in f64 space: a huge finite value would overflow Duration.
    if !seconds.is_finite() || seconds >= cap.as_secs_f64() {
        return cap;
    }
    Duration::from_secs_f64(seconds.max(0.0))
}

/// Retry configuration.
///
/// Immutable after construction; shared read-only across invocations.
pub struct RetryConfig<T, E> {
    /// Number of retries after the initial attempt
    pub max_attempts: u32,
    /// Which outcomes are worth retrying
    pub should_retry: OutcomePredicate<T, E>,
    /// Delay function between attempts
    pub backoff: Backoff,
}

impl<T, E> RetryConfig<T, E> {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder<T, E> {
        RetryConfigBuilder {
            max_attempts: None,
            should_retry: None,
            backoff: None,
        }
    }

    /// Wrap this configuration in a [`RetryPolicy`].
    #[must_use]
    pub fn into_policy(self) -> RetryPolicy<T, E> {
        RetryPolicy::new(self)
    }
}

impl<T, E> Default for RetryConfig<T, E> {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            should_retry: operation_failures(),
            backoff: Backoff::Exponential {
                base: 2.0,
                cap: Duration::from_secs(30),
            },
        }
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<T, E> {
    max_attempts: Option<u32>,
    should_retry: Option<OutcomePredicate<T, E>>,
    backoff: Option<Backoff>,
}

impl<T, E> RetryConfigBuilder<T, E> {
    /// Set the number of retries after the initial attempt.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the retry predicate.
    #[must_use]
    pub fn should_retry(mut self, predicate: OutcomePredicate<T, E>) -> Self {
        self.should_retry = Some(predicate);
        self
    }

    /// Set the delay function.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the [`RetryConfig`].
    #[must_use]
    pub fn build(self) -> RetryConfig<T, E> {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            should_retry: self.should_retry.unwrap_or(defaults.should_retry),
            backoff: self.backoff.unwrap_or(defaults.backoff),
        }
    }
}

/// Policy that re-invokes a failed or unsatisfactory operation.
///
/// A `Cancelled` outcome is never retried, regardless of the predicate, and
/// the inter-attempt delay races against the caller's token.
pub struct RetryPolicy<T, E> {
    config: RetryConfig<T, E>,
}

impl<T, E> RetryPolicy<T, E> {
    /// Create a retry policy from its configuration.
    #[must_use]
    pub const fn new(config: RetryConfig<T, E>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for RetryPolicy<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        let mut attempt: u32 = 0;

        loop {
            let outcome = op.invoke(cancel.clone()).await;

            if matches!(outcome, Err(ref e) if e.is_cancelled()) {
                return outcome;
            }

            if attempt >= self.config.max_attempts || !(self.config.should_retry)(&outcome) {
                if attempt > 0 && outcome.is_ok() {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return outcome;
            }

            attempt += 1;
            let delay = self.config.backoff.delay_for_attempt(attempt);
            tracing::warn!(attempt, ?delay, "outcome is retryable, retrying");

            if !delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(PolicyError::Cancelled),
                    () = sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use failgate_core::outcome::all_failures;
    use failgate_testing::operations::{counting_err, counting_ok, flaky};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn one_based_exponential_delays() {
        let backoff = Backoff::Exponential {
            base: 2.0,
            cap: Duration::from_secs(600),
        };

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));

        let backoff = Backoff::Exponential {
            base: 5.0,
            cap: Duration::from_secs(600),
        };
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(25));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let backoff = Backoff::Exponential {
            base: 10.0,
            cap: Duration::from_secs(2),
        };
        assert_eq!(backoff.delay_for_attempt(9), Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(base in 1.0f64..20.0, attempt in 1u32..64) {
            let cap = Duration::from_secs(30);
            let backoff = Backoff::Exponential { base, cap };
            prop_assert!(backoff.delay_for_attempt(attempt) <= cap);

            let backoff = Backoff::ExponentialJitter { base, cap };
            prop_assert!(backoff.delay_for_attempt(attempt) <= cap);
        }
    }

    #[tokio::test]
    async fn permanent_failure_invoked_n_plus_one_times() {
        let (op, invocations) = counting_err::<u32>("boom");
        let policy = RetryConfig::builder()
            .max_attempts(3)
            .backoff(Backoff::None)
            .build()
            .into_policy();

        let outcome = policy.execute(op, CancelToken::new()).await;

        assert_eq!(outcome, Err(PolicyError::Operation("boom".to_string())));
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_attempts_invokes_exactly_once() {
        let (op, invocations) = counting_err::<u32>("boom");
        let policy = RetryConfig::builder()
            .max_attempts(0)
            .backoff(Backoff::None)
            .build()
            .into_policy();

        let outcome = policy.execute(op, CancelToken::new()).await;

        assert_eq!(outcome, Err(PolicyError::Operation("boom".to_string())));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_on_success() {
        let (op, invocations) = counting_ok(7u32);
        let policy = RetryConfig::builder()
            .max_attempts(5)
            .backoff(Backoff::None)
            .build()
            .into_policy();

        let outcome = policy.execute(op, CancelToken::new()).await;

        assert_eq!(outcome, Ok(7));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_once_operation_recovers() {
        let (op, invocations) = flaky(2, 7u32);
        let policy = RetryConfig::builder()
            .max_attempts(5)
            .backoff(Backoff::None)
            .build()
            .into_policy();

        let outcome = policy.execute(op, CancelToken::new()).await;

        assert_eq!(outcome, Ok(7));
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn predicate_controls_retryability() {
        let (op, invocations) = counting_err::<u32>("permanent");
        let policy = RetryConfig::builder()
            .max_attempts(5)
            .backoff(Backoff::None)
            .should_retry(Arc::new(|outcome: &Outcome<u32, String>| {
                matches!(
                    outcome,
                    Err(PolicyError::Operation(msg)) if msg.contains("transient")
                )
            }))
            .build()
            .into_policy();

        let outcome = policy.execute(op, CancelToken::new()).await;

        assert!(outcome.is_err());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_outcome_is_never_retried() {
        let (op, invocations) = counting_err::<u32>("boom");
        let policy = RetryConfig::builder()
            .max_attempts(5)
            .backoff(Backoff::None)
            .should_retry(all_failures())
            .build()
            .into_policy();

        let token = CancelToken::new();
        token.cancel();

        let outcome = policy.execute(op, token).await;

        assert_eq!(outcome, Err(PolicyError::Cancelled));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delay_wait_unblocks_on_cancellation() {
        let (op, _invocations) = counting_err::<u32>("boom");
        let policy = Arc::new(
            RetryConfig::builder()
                .max_attempts(5)
                .backoff(Backoff::Constant(Duration::from_secs(60)))
                .build()
                .into_policy(),
        );

        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = policy.execute(op, token).await;

        assert_eq!(outcome, Err(PolicyError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
