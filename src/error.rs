//! Error types for graph construction, validation and execution
//!
//! This module defines every error kind the engine can surface, from
//! compile-time graph validation through runtime node failures and
//! resource disposal. All errors implement `std::error::Error` via the
//! `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! PipelineError
//! ├── GraphValidation            - malformed graph detected by the validator
//! ├── TypeMismatch                - edge/mapping/adapter type incompatibility
//! ├── NodeExecution               - a node's Execute raised, node-id attached
//! ├── RetryExhausted               - node restart budget spent
//! ├── CircuitOpen                  - breaker blocked execution
//! ├── ResourceExhausted            - dead-letter overflow / materialization cap
//! ├── LineageCardinalityMismatch   - observed vs declared cardinality (strict)
//! ├── Cancelled                    - user cancellation observed
//! └── ContextDisposalFailed        - one or more resources failed to dispose
//! ```
//!
//! # Propagation policy
//!
//! A transform error is first offered to the node's error handler
//! (skip/dead-letter/retry/fail). If the decision is `Fail`, or no handler is
//! registered, the error bubbles to the strategy layer, where the resilient
//! strategy may consult the pipeline error handler (restart/continue/fail).
//! Only `FailPipeline`, or an exhausted budget, surfaces a `PipelineError` to
//! the runner.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Convenience result type using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boxed source error, used wherever the engine wraps an opaque node/user
/// failure while preserving its chain.
pub type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// The kind of resource that was exhausted — distinguishes the two
/// `ResourceExhausted` triggers named in spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionKind {
    /// A dead-letter sink rejected a record because it is at capacity.
    DeadLetterOverflow,
    /// A capped replayable pipe would have exceeded its materialization cap.
    MaterializationCapExceeded,
}

impl fmt::Display for ExhaustionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustionKind::DeadLetterOverflow => write!(f, "dead-letter sink overflow"),
            ExhaustionKind::MaterializationCapExceeded => write!(f, "materialization cap exceeded"),
        }
    }
}

/// Comprehensive error type for all pipeline operations
///
/// Every node-id-bearing variant carries the failing node's display name so
/// callers can correlate failures with the graph descriptor without walking
/// the execution context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Graph structure validation failed.
    ///
    /// Raised by [`crate::graph::validator::GraphValidator`] when running in
    /// [`crate::graph::validator::ValidationMode::Error`]. Never raised at
    /// runtime — construction-time only.
    #[error("graph validation failed: {0}")]
    GraphValidation(String),

    /// An edge, lineage mapping, or adapter produced an incompatible type.
    #[error("type mismatch on edge {from} -> {to}: {detail}")]
    TypeMismatch {
        /// Source node id.
        from: String,
        /// Target node id.
        to: String,
        /// Human-readable description of the mismatch.
        detail: String,
    },

    /// A node's `Execute` call raised, after the node's own error handler
    /// (if any) has already declined to recover.
    #[error("node '{node}' execution failed: {source}")]
    NodeExecution {
        /// Failing node's display name.
        node: String,
        /// Original error, chain preserved.
        #[source]
        source: BoxedSource,
    },

    /// The resilient strategy's restart budget (`retry.max-node-restart-attempts`)
    /// was exhausted.
    #[error("node '{node}' exhausted its restart budget after {attempts} attempt(s)")]
    RetryExhausted {
        /// Node that kept failing.
        node: String,
        /// Number of restart attempts actually made.
        attempts: u32,
        /// The last failure observed before giving up.
        #[source]
        source: BoxedSource,
    },

    /// The node's circuit breaker is `Open` and blocked the call before it
    /// reached the node at all.
    #[error("circuit breaker for node '{node}' is open")]
    CircuitOpen {
        /// Node whose breaker tripped.
        node: String,
    },

    /// A capacity-bounded resource could not accept more work.
    #[error("resource exhausted for node '{node}': {kind}")]
    ResourceExhausted {
        /// Node that owns the exhausted resource.
        node: String,
        /// Which resource was exhausted.
        kind: ExhaustionKind,
    },

    /// Lineage adapter observed a cardinality that disagreed with the
    /// transform's declared cardinality, in strict mode.
    #[error(
        "node '{node}' declared cardinality {expected} but lineage observed {observed}"
    )]
    LineageCardinalityMismatch {
        /// Node whose outputs were mis-cardinalitied.
        node: String,
        /// Declared cardinality, rendered for display.
        expected: String,
        /// Observed cardinality, rendered for display.
        observed: String,
    },

    /// User cancellation was observed. Never counts as a node failure for
    /// restart budgeting or breaker trips.
    #[error("run was cancelled")]
    Cancelled,

    /// One or more registered resources failed to dispose when the context
    /// was torn down. Failures are aggregated, never dropped.
    #[error("{} resource(s) failed to dispose", .failures.len())]
    ContextDisposalFailed {
        /// Every disposal failure observed, in LIFO release order.
        failures: Vec<BoxedSource>,
    },
}

impl PipelineError {
    /// Build a [`PipelineError::NodeExecution`].
    pub fn node_execution(node: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Build a [`PipelineError::RetryExhausted`].
    pub fn retry_exhausted(
        node: impl Into<String>,
        attempts: u32,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::RetryExhausted {
            node: node.into(),
            attempts,
            source: source.into(),
        }
    }

    /// Build a [`PipelineError::TypeMismatch`].
    pub fn type_mismatch(
        from: impl Into<String>,
        to: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            from: from.into(),
            to: to.into(),
            detail: detail.into(),
        }
    }

    /// True if this error kind must never be attributed to a node failure
    /// budget (restart counters, breaker trips) — currently only
    /// cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn node_execution_preserves_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err = PipelineError::node_execution("transform-1", io_err);
        let rendered = format!("{err}");
        assert!(rendered.contains("transform-1"));
        assert!(err.source().is_some());
    }

    #[test]
    fn cancellation_is_flagged() {
        assert!(PipelineError::Cancelled.is_cancellation());
        assert!(!PipelineError::GraphValidation("x".into()).is_cancellation());
    }

    #[test]
    fn disposal_failure_counts_aggregate() {
        let failures: Vec<BoxedSource> = vec![
            Box::new(io::Error::new(io::ErrorKind::Other, "a")),
            Box::new(io::Error::new(io::ErrorKind::Other, "b")),
        ];
        let err = PipelineError::ContextDisposalFailed { failures };
        assert_eq!(format!("{err}"), "2 resource(s) failed to dispose");
    }
}
