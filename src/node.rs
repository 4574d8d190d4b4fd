//! Node contracts — what an external node author implements
//!
//! The runtime never constructs business logic itself; it calls into these
//! traits. Concrete connectors (CSV/JSON/Postgres/blob-storage readers and
//! writers) are out of scope for this crate and live in host applications
//! or connector crates — only the contracts are defined here.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::pipe::{BoxedPipe, CancellationToken};

/// A node that produces items with no upstream input. Owns disposal of
/// whatever resource it opens (a file handle, a connection) by registering
/// it with the context during [`Source::initialize`].
#[async_trait]
pub trait Source: Send + Sync {
    /// The type of item this source produces.
    type Output: Send + 'static;

    /// Build the lazy output sequence. Called once per run, before the
    /// scheduler starts pulling.
    async fn initialize(
        &self,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<BoxedPipe<Self::Output>>;
}

/// Whether a node may be called concurrently for multiple in-flight items.
/// Declared by the node, consulted by the fan-out/parallel strategy; a node
/// that does not opt in is always invoked strictly serialized.
pub trait ParallelismSafety {
    /// `true` if concurrent calls to `execute` are safe.
    fn is_parallelism_safe(&self) -> bool {
        false
    }
}

/// A node that maps one input item to one output item. Cardinality beyond
/// 1:1 (expansion, collapse) is expressed by pairing a [`Transform`] with
/// the appropriate [`crate::graph::Cardinality`] and letting the lineage
/// adapter and strategy layer observe the actual counts; the trait itself
/// stays 1:1 at the Rust level, matching how the teacher keeps node
/// contracts narrow and pushes fan-out/fan-in into the scheduler.
#[async_trait]
pub trait Transform: ParallelismSafety + Send + Sync {
    /// Input item type.
    type Input: Send + 'static;
    /// Output item type.
    type Output: Send + 'static;

    /// Process one item.
    async fn execute(
        &self,
        item: Self::Input,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Self::Output>;
}

/// A node that drives iteration of its input to completion; nothing
/// downstream of a sink exists.
#[async_trait]
pub trait Sink: Send + Sync {
    /// The type of item this sink consumes.
    type Input: Send + 'static;

    /// Drain `input` to completion.
    async fn execute(
        &self,
        input: BoxedPipe<Self::Input>,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// A node with more than one named input, each with its own key selector
/// for matching rows across inputs.
#[async_trait]
pub trait Join: Send + Sync {
    /// Joined output type.
    type Output: Send + 'static;

    /// Names of this join's inputs, in the order their key selectors were
    /// registered.
    fn input_names(&self) -> &[String];

    /// Extract the join key from a named input's raw item, pre-serialized
    /// to a string by the caller (the core has no knowledge of the
    /// concrete per-input payload type, only that it can be keyed).
    fn key_for(&self, input_name: &str, raw_item: &str) -> Option<String>;

    /// Produce the joined output once all inputs sharing a key have
    /// arrived. `rows` is the set of raw, pre-serialized matching rows
    /// across every input, one slot per input name in `input_names` order.
    async fn combine(
        &self,
        key: &str,
        rows: Vec<Option<String>>,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Self::Output>;
}

/// A node that consumes a full collection (or window) of items and
/// produces zero or more outputs.
#[async_trait]
pub trait Aggregate: Send + Sync {
    /// Input item type.
    type Input: Send + 'static;
    /// Output item type.
    type Output: Send + 'static;

    /// Aggregate `items` into zero or more outputs.
    async fn aggregate(
        &self,
        items: Vec<Self::Input>,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Self::Output>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{CancellationSource, MaterializedPipe};
    use std::collections::HashMap;

    struct Doubler;

    #[async_trait]
    impl Transform for Doubler {
        type Input = i32;
        type Output = i32;

        async fn execute(
            &self,
            item: i32,
            _context: &ExecutionContext,
            _cancel: &CancellationToken,
        ) -> Result<i32> {
            Ok(item * 2)
        }
    }

    impl ParallelismSafety for Doubler {}

    struct CollectSink;

    #[async_trait]
    impl Sink for CollectSink {
        type Input = i32;

        async fn execute(
            &self,
            mut input: BoxedPipe<i32>,
            context: &ExecutionContext,
            cancel: &CancellationToken,
        ) -> Result<()> {
            let mut total = 0;
            while let Some(item) = input.next(cancel).await? {
                total += item;
            }
            context.set_item("total", total.to_string()).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn transform_and_sink_contracts_compose() {
        let (_src, cancel) = CancellationSource::new();
        let context = ExecutionContext::new(cancel.clone(), HashMap::new());
        let doubler = Doubler;
        let mut doubled = Vec::new();
        for item in [1, 2, 3] {
            doubled.push(doubler.execute(item, &context, &cancel).await.unwrap());
        }
        let pipe: BoxedPipe<i32> = Box::new(MaterializedPipe::new("doubled", doubled));
        let sink = CollectSink;
        sink.execute(pipe, &context, &cancel).await.unwrap();
        assert_eq!(context.item("total").await.as_deref(), Some("12"));
    }

    #[test]
    fn default_parallelism_safety_is_false() {
        struct Plain;
        impl ParallelismSafety for Plain {}
        assert!(!Plain.is_parallelism_safe());
    }
}
