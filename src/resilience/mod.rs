//! Resilience core — retry delay strategies and circuit breaking
//!
//! These two pieces are consulted together by
//! [`crate::strategy::resilient::ResilientStrategy`]: the circuit breaker
//! decides whether a node should be called at all, and the retry options
//! decide how long to wait between attempts once a call is allowed but
//! fails.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerState};
pub use retry::{DecorrelatedJitter, DelayStrategy, Exponential, Fixed, RetryOptions};
