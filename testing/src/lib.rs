//! # Failgate Testing
//!
//! Testing utilities for the Failgate engine.
//!
//! This crate provides:
//! - Instrumented operations with invocation counters
//! - Operations with scripted behavior (flaky, sleeping, gated)
//! - A recording breaker observer for asserting transition events
//!
//! ## Example
//!
//! ```ignore
//! use failgate_testing::operations::counting_err;
//! use std::sync::atomic::Ordering;
//!
//! #[tokio::test]
//! async fn retries_three_times() {
//!     let (op, invocations) = counting_err::<u32>("boom");
//!     let outcome = policy.execute(op, CancelToken::new()).await;
//!     assert_eq!(invocations.load(Ordering::SeqCst), 4);
//! }
//! ```

/// Instrumented and scripted operations
pub mod operations;

/// Recording observers for transition events
pub mod observers;

pub use observers::RecordingObserver;
pub use operations::{Gate, cooperative, counting_err, counting_ok, flaky, gated, sleeping};
