//! # Failgate Core
//!
//! Core traits and types for the Failgate resilience policy engine.
//!
//! This crate provides the fundamental abstractions for wrapping asynchronous
//! operations with stackable resilience behaviors.
//!
//! ## Core Concepts
//!
//! - **Operation**: A re-invocable unit of asynchronous work that yields an
//!   [`Outcome`](outcome::Outcome)
//! - **Outcome**: Success value or one classified failure
//!   ([`PolicyError`](outcome::PolicyError))
//! - **Policy**: Middleware around an operation with a single `execute`
//!   entry point
//! - **Composer**: [`wrap`](policy::wrap) and [`PolicyChain`](policy::PolicyChain)
//!   nest policies outermost-first
//! - **CancelToken**: Caller-supplied cancellation signal propagated through
//!   every layer down to the operation
//!
//! ## Example
//!
//! ```ignore
//! use failgate_core::prelude::*;
//!
//! let op = Operation::from_result_fn(|_cancel| async {
//!     Ok::<_, String>("hello")
//! });
//!
//! let policy = PolicyChain::new()
//!     .layer(retry)          // outermost
//!     .layer(breaker)        // inner
//!     .build();
//!
//! let outcome = policy.execute(op, CancelToken::new()).await;
//! ```

/// Cancellation token propagated through policy layers
pub mod cancel;

/// The unit-of-work abstraction executed under policy control
pub mod operation;

/// Outcome type and the classified failure taxonomy
pub mod outcome;

/// The `Policy` trait and the composition primitives
pub mod policy;

/// Commonly used types, re-exported in one place
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::operation::Operation;
    pub use crate::outcome::{Outcome, OutcomePredicate, PolicyError};
    pub use crate::policy::{Policy, PolicyChain, SharedPolicy, wrap};
}

pub use cancel::CancelToken;
pub use operation::Operation;
pub use outcome::{Outcome, OutcomePredicate, PolicyError};
pub use policy::{Policy, PolicyChain, SharedPolicy, wrap};
