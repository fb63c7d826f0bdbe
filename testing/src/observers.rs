//! Recording observers for transition events.

use chrono::{DateTime, Utc};
use failgate_policies::circuit_breaker::BreakerObserver;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Breaker observer that records every transition for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    breaks: AtomicUsize,
    resets: AtomicUsize,
    half_opens: AtomicUsize,
    last_break_cause: Mutex<Option<String>>,
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `on_break` notifications received.
    #[must_use]
    pub fn breaks(&self) -> usize {
        self.breaks.load(Ordering::SeqCst)
    }

    /// Number of `on_reset` notifications received.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Number of `on_half_open` notifications received.
    #[must_use]
    pub fn half_opens(&self) -> usize {
        self.half_opens.load(Ordering::SeqCst)
    }

    /// Cause attached to the most recent `on_break`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn last_break_cause(&self) -> Option<String> {
        self.last_break_cause.lock().unwrap().clone()
    }

    /// Transition names in arrival order (`break`, `reset`, `half_open`).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[allow(clippy::unwrap_used)]
impl BreakerObserver for RecordingObserver {
    fn on_break(&self, cause: &str, _break_duration: Duration, _at: DateTime<Utc>) {
        self.breaks.fetch_add(1, Ordering::SeqCst);
        *self.last_break_cause.lock().unwrap() = Some(cause.to_string());
        self.events.lock().unwrap().push("break".to_string());
    }

    fn on_reset(&self, _at: DateTime<Utc>) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push("reset".to_string());
    }

    fn on_half_open(&self, _at: DateTime<Utc>) {
        self.half_opens.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push("half_open".to_string());
    }
}
