//! Top-level run orchestration
//!
//! Ties the graph validator, execution context, and a caller-assembled
//! chain of strategies together for one run. The runner does not resolve
//! node implementations itself — per spec.md §6, concrete node
//! implementations and the builder surface that wires a graph descriptor's
//! node ids to live [`crate::node`] trait objects are host-application
//! concerns. What the runner owns is everything else: validating the graph
//! once, constructing and disposing the [`ExecutionContext`], driving the
//! caller-supplied chain to completion, and assembling the terminal
//! diagnostics spec.md §7 calls for.
//!
//! This is necessarily scoped to a homogeneous chain (every node in the run
//! shares one Rust item type `T`) — see `DESIGN.md` for why a fully
//! heterogeneous, type-erased executor is out of scope for this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::graph::validator::GraphValidator;
use crate::graph::Graph;
use crate::pipe::BoxedPipe;

/// Terminal diagnostics bundle for a completed (or failed) run, matching
/// spec.md §7's "terminal diagnostic items stashed in the context."
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Total node restarts honored across the run.
    pub failures: u32,
    /// Consecutive failures observed on the node that failed last,
    /// `0` if the run completed cleanly or ended via `ContinueWithoutNode`.
    pub consecutive_failures: u32,
    /// Items routed to a dead-letter sink.
    pub dead_letter_count: u64,
    /// Resources released during context disposal.
    pub disposed_resources: usize,
}

/// Counters threaded through a run via [`ExecutionContext`] properties,
/// read back into a [`RunSummary`] once the run ends.
pub struct RunCounters {
    failures: AtomicU32,
    consecutive_failures: AtomicU32,
    dead_letter_count: AtomicU64,
}

impl RunCounters {
    /// Build a fresh, zeroed counter set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            dead_letter_count: AtomicU64::new(0),
        })
    }

    /// Record a node restart.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a successful item, resetting the consecutive-failure streak.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Record one dead-lettered item.
    pub fn record_dead_letter(&self) {
        self.dead_letter_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Node restarts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Current consecutive-failure streak.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Items routed to a dead-letter sink so far.
    pub fn dead_letter_count(&self) -> u64 {
        self.dead_letter_count.load(Ordering::SeqCst)
    }
}

/// Ties graph validation, context lifecycle, and a caller-assembled
/// execution chain together for a single run.
pub struct Runner;

impl Runner {
    /// Validate `graph` under `validator`, then drive `chain` (the
    /// caller's composed strategies wrapping `source`) to completion via
    /// `drain`, disposing `context` regardless of outcome.
    ///
    /// `drain` takes the fully-assembled terminal pipe and pulls it to
    /// exhaustion (this is the sink's job in spec.md's data-flow
    /// narrative); the runner itself never constructs a sink.
    pub async fn execute<T, F, D, Fut>(
        graph: &Graph,
        validator: &GraphValidator,
        context: Arc<ExecutionContext>,
        counters: Arc<RunCounters>,
        source: BoxedPipe<T>,
        chain: F,
        drain: D,
    ) -> Result<RunSummary>
    where
        T: Send + 'static,
        F: FnOnce(BoxedPipe<T>) -> BoxedPipe<T>,
        D: FnOnce(BoxedPipe<T>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        validator.validate_or_err(graph)?;

        let terminal = chain(source);
        let run_result = drain(terminal).await;

        let disposal_result = context.dispose().await;

        run_result?;

        let disposed_resources = match &disposal_result {
            Ok(()) => 0,
            Err(crate::error::PipelineError::ContextDisposalFailed { failures }) => failures.len(),
            Err(_) => 0,
        };
        disposal_result?;

        Ok(RunSummary {
            failures: counters.failures.load(Ordering::SeqCst),
            consecutive_failures: counters.consecutive_failures.load(Ordering::SeqCst),
            dead_letter_count: counters.dead_letter_count.load(Ordering::SeqCst),
            disposed_resources,
        })
    }
}
