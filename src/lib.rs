//! flowcore — a typed, resilient dataflow pipeline execution engine
//!
//! A pipeline is a directed acyclic [`graph::Graph`] of typed nodes
//! ([`node::Source`], [`node::Transform`], [`node::Sink`], [`node::Join`],
//! [`node::Aggregate`]) connected by [`pipe::Pipe`]s — lazy, pull-based
//! sequences that do no work until the terminal sink starts drawing items
//! through them.
//!
//! The engine is organized in layers, outer to inner:
//!
//! - [`graph`] — the immutable node/edge descriptor and its validator.
//! - [`runner`] — ties graph validation, [`context::ExecutionContext`]
//!   lifecycle, and a caller-assembled strategy chain together for one run.
//! - [`strategy`] — per-node execution shape: sequential, fan-out/parallel,
//!   batching/unbatching, merge, and the resilient wrapper that adds
//!   restart/replay/circuit-breaker behavior around any of the others.
//! - [`resilience`] — the retry delay strategies and circuit breaker the
//!   resilient strategy consults.
//! - [`lineage`] — optional per-item provenance tracking and cardinality
//!   enforcement.
//! - [`handlers`] and [`observability`] — the error-decision and event
//!   surfaces a host application implements to customize recovery and
//!   monitoring.
//! - [`config`] — serde-deserializable option structs a host application
//!   loads from its own configuration format.
//!
//! Concrete node implementations (CSV readers, database sinks, HTTP
//! transforms) and the builder surface that wires a [`graph::Graph`]
//! descriptor's node ids to live trait objects are host-application
//! concerns; this crate defines the contracts and the machinery that
//! executes them, not the connectors themselves.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod lineage;
pub mod node;
pub mod observability;
pub mod pipe;
pub mod resilience;
pub mod runner;
pub mod strategy;

pub use config::{ErrorHandlingOptions, ExecutionOptions, LineageOptions, PipelineOptions};
pub use context::{Disposable, ExecutionContext};
pub use error::{PipelineError, Result};
pub use graph::{Cardinality, Edge, Graph, MergeConfig, NodeDescriptor, NodeId, NodeKind};
pub use handlers::{
    AlwaysFail, DeadLetterSink, FailFast, InMemoryDeadLetterSink, NodeErrorDecision,
    NodeErrorHandler, PipelineErrorDecision, PipelineErrorHandler,
};
pub use lineage::{CardinalityEnforcer, LineagePacket, Mode as LineageMode, Observed};
pub use node::{Aggregate, Join, ParallelismSafety, Sink, Source, Transform};
pub use observability::{CompositeObserver, NullObserver, Observer, ObserverEvent};
pub use pipe::{BoxedPipe, CancellationSource, CancellationToken, MaterializedPipe, Pipe, StreamingPipe};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerState,
    DecorrelatedJitter, DelayStrategy, Exponential, Fixed, RetryOptions,
};
pub use runner::{RunCounters, RunSummary, Runner};
pub use strategy::{
    BatchingStrategy, BuildFn, FanOutStrategy, MergeStrategy, OrderingMode, ResilientStrategy,
    SequentialStrategy, UnbatchingStrategy,
};
