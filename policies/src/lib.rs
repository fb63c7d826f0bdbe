//! # Failgate Policies
//!
//! Resilience policy implementations for the Failgate engine.
//!
//! Each policy is a self-contained [`Policy`](failgate_core::Policy)
//! implementation that can be stacked in any order through
//! [`wrap`](failgate_core::wrap) or
//! [`PolicyChain`](failgate_core::PolicyChain):
//!
//! - **Retry**: re-invokes a failed or unsatisfactory operation with
//!   configurable backoff
//! - **Circuit Breaker**: counts consecutive or windowed failures and
//!   short-circuits calls during an open period
//! - **Timeout**: bounds execution time, optimistically or pessimistically
//! - **Bulkhead**: caps concurrent executions and queued waiters
//! - **Fallback**: substitutes a safe result when the operation ultimately
//!   fails
//!
//! ## Example
//!
//! ```ignore
//! use failgate_core::prelude::*;
//! use failgate_policies::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let retry = Arc::new(
//!     RetryConfig::builder()
//!         .max_attempts(2)
//!         .backoff(Backoff::Constant(Duration::from_secs(5)))
//!         .build()
//!         .into_policy(),
//! );
//! let breaker = Arc::new(CircuitBreaker::consecutive(
//!     ConsecutiveBreakerConfig::default(),
//! ));
//!
//! let policy = PolicyChain::new().layer(retry).layer(breaker).build();
//! let outcome = policy.execute(op, CancelToken::new()).await;
//! ```

/// Retry with configurable backoff
pub mod retry;

/// Circuit breaker state machine, consecutive and rate-based
pub mod circuit_breaker;

/// Execution deadlines, optimistic and pessimistic
pub mod timeout;

/// Concurrency limiting with a bounded queue
pub mod bulkhead;

/// Safe-result substitution for terminal failures
pub mod fallback;

/// Commonly used types, re-exported in one place
pub mod prelude {
    pub use crate::bulkhead::{Bulkhead, BulkheadConfig};
    pub use crate::circuit_breaker::{
        BreakerMetrics, BreakerObserver, CircuitBreaker, CircuitState, ConsecutiveBreakerConfig,
        RateBreakerConfig,
    };
    pub use crate::fallback::FallbackPolicy;
    pub use crate::retry::{Backoff, RetryConfig, RetryPolicy};
    pub use crate::timeout::{TimeoutConfig, TimeoutMode, TimeoutPolicy};
}

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit_breaker::{
    BreakerMetrics, BreakerObserver, CircuitBreaker, CircuitState, ConsecutiveBreakerConfig,
    RateBreakerConfig,
};
pub use fallback::FallbackPolicy;
pub use retry::{Backoff, RetryConfig, RetryPolicy};
pub use timeout::{TimeoutConfig, TimeoutMode, TimeoutPolicy};
