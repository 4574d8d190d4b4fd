//! Execution strategies — how a node's input pipe becomes its output pipe
//!
//! Each strategy is a small, independently testable transform from one
//! pipe to another; composition (wrapping a sequential or batching
//! strategy in a resilient one, feeding a fan-out strategy from a merge)
//! happens by chaining their `apply` calls, not through a shared trait
//! hierarchy — matching spec.md §9's guidance to prefer function values and
//! small objects over a virtual inheritance hierarchy.

pub mod batching;
pub mod fanout;
pub mod merge;
pub mod resilient;
pub mod sequential;
pub mod unbatching;

pub use batching::BatchingStrategy;
pub use fanout::{FanOutStrategy, OrderingMode};
pub use merge::MergeStrategy;
pub use resilient::{BuildFn, ResilientStrategy};
pub use sequential::SequentialStrategy;
pub use unbatching::UnbatchingStrategy;
