//! Circuit breaker state machine for preventing cascading failures.
//!
//! # States
//!
//! - **Closed**: calls pass through; failures are counted
//! - **Open**: calls short-circuit with `CircuitOpen` without invoking the
//!   operation; the rejection is never counted as a new failure
//! - **HalfOpen**: exactly one trial call probes recovery; its outcome alone
//!   decides Closed (success) or Open again (failure)
//!
//! The Open → HalfOpen transition is checked lazily on the next call once the
//! break duration has elapsed; no background timer runs.
//!
//! # Variants
//!
//! [`CircuitBreaker::consecutive`] opens after N consecutive failures (the
//! counter resets on any success). [`CircuitBreaker::rate_based`] keeps a
//! trailing window of outcomes and opens only when the window holds at least
//! `minimum_throughput` calls **and** the failure ratio reaches the
//! threshold.
//!
//! Which outcomes count as failures is a caller-supplied predicate;
//! cancellation never counts, regardless of the predicate.
//!
//! # Example
//!
//! ```ignore
//! use failgate_policies::circuit_breaker::{CircuitBreaker, ConsecutiveBreakerConfig};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::consecutive(
//!     ConsecutiveBreakerConfig::builder()
//!         .failure_threshold(4)
//!         .break_duration(Duration::from_secs(20))
//!         .build(),
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use failgate_core::cancel::CancelToken;
use failgate_core::operation::Operation;
use failgate_core::outcome::{Outcome, OutcomePredicate, PolicyError, failures_and_timeouts};
use failgate_core::policy::Policy;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Requests fail immediately without invoking the operation
    Open,
    /// A single trial call is probing recovery
    HalfOpen,
}

/// Observer for breaker transitions.
///
/// Each hook fires exactly once per transition, synchronously with the
/// transition, replacing ad-hoc logging at the call site. All hooks default
/// to no-ops so implementors pick what they need.
pub trait BreakerObserver: Send + Sync {
    /// The circuit opened. `cause` describes the outcome that tripped it.
    fn on_break(&self, cause: &str, break_duration: Duration, at: DateTime<Utc>) {
        let _ = (cause, break_duration, at);
    }

    /// The circuit closed after a successful probe.
    fn on_reset(&self, at: DateTime<Utc>) {
        let _ = at;
    }

    /// The circuit moved to `HalfOpen` and admitted a probe.
    fn on_half_open(&self, at: DateTime<Utc>) {
        let _ = at;
    }
}

struct NoopObserver;

impl BreakerObserver for NoopObserver {}

/// Configuration for the consecutive-failure variant.
#[derive(Debug, Clone)]
pub struct ConsecutiveBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing recovery
    pub break_duration: Duration,
}

impl Default for ConsecutiveBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl ConsecutiveBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> ConsecutiveBreakerConfigBuilder {
        ConsecutiveBreakerConfigBuilder {
            failure_threshold: None,
            break_duration: None,
        }
    }
}

/// Builder for [`ConsecutiveBreakerConfig`].
#[derive(Debug, Clone)]
pub struct ConsecutiveBreakerConfigBuilder {
    failure_threshold: Option<u32>,
    break_duration: Option<Duration>,
}

impl ConsecutiveBreakerConfigBuilder {
    /// Set the consecutive-failure threshold.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Set how long the circuit stays open.
    #[must_use]
    pub const fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = Some(duration);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ConsecutiveBreakerConfig {
        let defaults = ConsecutiveBreakerConfig::default();
        ConsecutiveBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            break_duration: self.break_duration.unwrap_or(defaults.break_duration),
        }
    }
}

/// Configuration for the rate-based variant.
///
/// The circuit opens only when, within the trailing `sampling_duration`, at
/// least `minimum_throughput` calls occurred and the failure ratio reached
/// `failure_ratio`.
#[derive(Debug, Clone)]
pub struct RateBreakerConfig {
    /// Failure ratio in `(0, 1]` that trips the circuit
    pub failure_ratio: f64,
    /// Length of the trailing outcome window
    pub sampling_duration: Duration,
    /// Minimum calls in the window before the ratio is considered
    pub minimum_throughput: u32,
    /// How long the circuit stays open before probing recovery
    pub break_duration: Duration,
}

impl Default for RateBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.3,
            sampling_duration: Duration::from_secs(60),
            minimum_throughput: 9,
            break_duration: Duration::from_secs(30),
        }
    }
}

/// Failure accounting for the two breaker variants.
enum FailureTracker {
    Consecutive {
        threshold: u32,
        failures: u32,
    },
    Windowed {
        ratio: f64,
        window: Duration,
        minimum_throughput: u32,
        samples: VecDeque<(Instant, bool)>,
    },
}

impl FailureTracker {
    fn record_success(&mut self, now: Instant) {
        match self {
            Self::Consecutive { failures, .. } => *failures = 0,
            Self::Windowed {
                samples, window, ..
            } => {
                prune(samples, *window, now);
                samples.push_back((now, false));
            }
        }
    }

    /// Record a failure; returns true when the circuit should open.
    #[allow(clippy::cast_precision_loss)]
    fn record_failure(&mut self, now: Instant) -> bool {
        match self {
            Self::Consecutive {
                threshold,
                failures,
            } => {
                *failures += 1;
                *failures >= *threshold
            }
            Self::Windowed {
                ratio,
                window,
                minimum_throughput,
                samples,
            } => {
                prune(samples, *window, now);
                samples.push_back((now, true));

                let total = samples.len() as u64;
                if total < u64::from(*minimum_throughput) {
                    return false;
                }
                let failed = samples.iter().filter(|(_, f)| *f).count() as u64;
                failed as f64 / total as f64 >= *ratio
            }
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Consecutive { failures, .. } => *failures = 0,
            Self::Windowed { samples, .. } => samples.clear(),
        }
    }
}

fn prune(samples: &mut VecDeque<(Instant, bool)>, window: Duration, now: Instant) {
    while let Some(&(at, _)) = samples.front() {
        if now.duration_since(at) > window {
            samples.pop_front();
        } else {
            break;
        }
    }
}

/// How a call was admitted. Only the holder of the probe slot may decide
/// the HalfOpen verdict; regular admissions that complete after a
/// transition are stale and ignored.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Admission {
    Regular,
    Probe,
}

/// Internal state, guarded by one lock per breaker instance.
struct BreakerInner {
    state: CircuitState,
    tracker: FailureTracker,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Snapshot of breaker activity counters.
#[derive(Debug, Clone, Copy)]
pub struct BreakerMetrics {
    /// Calls that reached the breaker
    pub total_calls: u64,
    /// Outcomes recorded as successes
    pub total_successes: u64,
    /// Outcomes recorded as failures
    pub total_failures: u64,
    /// Calls short-circuited while the circuit was open
    pub total_rejections: u64,
}

/// Circuit breaker policy.
///
/// Owns its mutable state exclusively; the lock is scoped around admission
/// checks and outcome recording, never around the operation's execution.
pub struct CircuitBreaker<T, E> {
    break_duration: Duration,
    should_handle: OutcomePredicate<T, E>,
    observer: Arc<dyn BreakerObserver>,
    inner: Arc<RwLock<BreakerInner>>,
    total_calls: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl<T, E> CircuitBreaker<T, E> {
    /// Breaker that opens after N consecutive failures.
    #[must_use]
    pub fn consecutive(config: ConsecutiveBreakerConfig) -> Self {
        Self::with_tracker(
            config.break_duration,
            FailureTracker::Consecutive {
                threshold: config.failure_threshold,
                failures: 0,
            },
        )
    }

    /// Breaker that opens on a failure ratio over a trailing window.
    #[must_use]
    pub fn rate_based(config: RateBreakerConfig) -> Self {
        Self::with_tracker(
            config.break_duration,
            FailureTracker::Windowed {
                ratio: config.failure_ratio,
                window: config.sampling_duration,
                minimum_throughput: config.minimum_throughput,
                samples: VecDeque::new(),
            },
        )
    }

    fn with_tracker(break_duration: Duration, tracker: FailureTracker) -> Self {
        Self {
            break_duration,
            should_handle: failures_and_timeouts(),
            observer: Arc::new(NoopObserver),
            inner: Arc::new(RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                tracker,
                opened_at: None,
                probe_in_flight: false,
            })),
            total_calls: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Replace the failure-classification predicate.
    ///
    /// The default counts operation failures and timeouts. Cancellation
    /// never counts, regardless of the predicate.
    #[must_use]
    pub fn handling(mut self, predicate: OutcomePredicate<T, E>) -> Self {
        self.should_handle = predicate;
        self
    }

    /// Attach a transition observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        BreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Admission check; may perform the lazy Open → HalfOpen transition.
    ///
    /// `None` rejects the call. Closed-state admissions take only the read
    /// lock; the write lock is reserved for transitions.
    async fn admit(&self) -> Option<Admission> {
        if self.inner.read().await.state == CircuitState::Closed {
            return Some(Admission::Regular);
        }

        let mut inner = self.inner.write().await;
        match inner.state {
            // Closed again between the two locks: a probe just succeeded.
            CircuitState::Closed => Some(Admission::Regular),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed());
                if elapsed.is_some_and(|e| e >= self.break_duration) {
                    tracing::info!("circuit breaker transitioning OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    self.observer.on_half_open(Utc::now());
                    Some(Admission::Probe)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Admission::Probe)
                }
            }
        }
    }

    fn open_locked(&self, inner: &mut BreakerInner, cause: &str) {
        tracing::warn!(cause, "circuit breaker transitioning to OPEN");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        self.observer.on_break(cause, self.break_duration, Utc::now());
    }

    fn close_locked(&self, inner: &mut BreakerInner) {
        tracing::info!("circuit breaker transitioning HALF_OPEN -> CLOSED (recovered)");
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        inner.tracker.reset();
        self.observer.on_reset(Utc::now());
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for CircuitBreaker<T, E>
where
    T: Send + 'static,
    E: Send + std::fmt::Display + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let Some(admission) = self.admit().await else {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(PolicyError::CircuitOpen);
        };

        let outcome = op.invoke(cancel).await;

        let mut inner = self.inner.write().await;

        if matches!(outcome, Err(ref e) if e.is_cancelled()) {
            // Cancellation is not evidence either way; release the probe
            // slot so the next call may try again.
            if admission == Admission::Probe && inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
            return outcome;
        }

        let is_failure = (self.should_handle)(&outcome);
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                if is_failure {
                    self.total_failures.fetch_add(1, Ordering::Relaxed);
                    if inner.tracker.record_failure(now) {
                        let cause = describe(&outcome);
                        self.open_locked(&mut inner, &cause);
                    }
                } else {
                    self.total_successes.fetch_add(1, Ordering::Relaxed);
                    inner.tracker.record_success(now);
                }
            }
            CircuitState::HalfOpen if admission == Admission::Probe => {
                if is_failure {
                    self.total_failures.fetch_add(1, Ordering::Relaxed);
                    let cause = describe(&outcome);
                    self.open_locked(&mut inner, &cause);
                } else {
                    self.total_successes.fetch_add(1, Ordering::Relaxed);
                    self.close_locked(&mut inner);
                }
            }
            // Admitted before a concurrent transition (while Closed, or
            // before another caller opened the circuit); the outcome is
            // stale and no longer affects the state machine.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }

        outcome
    }
}

fn describe<T, E: std::fmt::Display>(outcome: &Outcome<T, E>) -> String {
    match outcome {
        Err(e) => e.to_string(),
        Ok(_) => "result classified as unsuccessful".to_string(),
    }
}
