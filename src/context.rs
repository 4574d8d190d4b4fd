//! Execution context — the per-run grab-bag threaded through every strategy
//! and node invocation.
//!
//! Carries the cancellation token, run-scoped parameter/item/property maps,
//! a scoped-node stack used for attributing logs and errors to whichever
//! node is currently executing, and a LIFO resource registry for anything a
//! node or strategy needs disposed when the run ends (file handles, pooled
//! connections, anything implementing [`Disposable`]).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::pipe::CancellationToken;

/// Anything registered with the context for teardown at the end of a run.
#[async_trait::async_trait]
pub trait Disposable: Send + Sync {
    /// Release the resource. Called at most once, in LIFO registration
    /// order, when the context is disposed.
    async fn dispose(&self) -> std::result::Result<(), crate::error::BoxedSource>;
}

/// Guard returned by [`ExecutionContext::push_node`]; pops its node off the
/// scoped-node stack when dropped, restoring whatever scope was active
/// before it (LIFO, so nested pushes unwind correctly even across `?`).
pub struct ScopedNode<'a> {
    ctx: &'a ExecutionContext,
    active: bool,
}

impl Drop for ScopedNode<'_> {
    fn drop(&mut self) {
        if self.active {
            let mut stack = self.ctx.node_stack.blocking_lock_or_noop();
            stack.pop();
        }
    }
}

/// Minimal blocking-free lock helper: `ExecutionContext` is accessed from
/// both sync (`Drop`) and async call sites, so the node stack uses a
/// `std::sync::Mutex` rather than an async one — it is only ever held for
/// the duration of a `Vec::push`/`pop`.
struct SyncStack(std::sync::Mutex<Vec<String>>);

impl SyncStack {
    fn new() -> Self {
        Self(std::sync::Mutex::new(Vec::new()))
    }

    fn blocking_lock_or_noop(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-run execution state shared across strategies, nodes, and the lineage
/// and resilience layers.
pub struct ExecutionContext {
    cancel: CancellationToken,
    parameters: HashMap<String, String>,
    items: Mutex<HashMap<String, String>>,
    properties: Mutex<HashMap<String, String>>,
    node_stack: SyncStack,
    resources: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl ExecutionContext {
    /// Build a fresh context for one run.
    pub fn new(cancel: CancellationToken, parameters: HashMap<String, String>) -> Self {
        Self {
            cancel,
            parameters,
            items: Mutex::new(HashMap::new()),
            properties: Mutex::new(HashMap::new()),
            node_stack: SyncStack::new(),
            resources: Mutex::new(Vec::new()),
        }
    }

    /// The cancellation token threaded through this run.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Read-only run parameters, fixed for the lifetime of the context.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Set a run-scoped item (mutable, read/write for the duration of the run).
    pub async fn set_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.items.lock().await.insert(key.into(), value.into());
    }

    /// Read a run-scoped item.
    pub async fn item(&self, key: &str) -> Option<String> {
        self.items.lock().await.get(key).cloned()
    }

    /// Set a run-scoped property (distinct namespace from items; used by
    /// strategies/observers rather than node authors).
    pub async fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.lock().await.insert(key.into(), value.into());
    }

    /// Read a run-scoped property.
    pub async fn property(&self, key: &str) -> Option<String> {
        self.properties.lock().await.get(key).cloned()
    }

    /// Push a node onto the scoped-node stack; the returned guard pops it on
    /// drop, so nested invocations (a join pulling from upstream nodes)
    /// unwind correctly regardless of how the inner call returns.
    pub fn push_node(&self, node_id: impl Into<String>) -> ScopedNode<'_> {
        self.node_stack.blocking_lock_or_noop().push(node_id.into());
        ScopedNode {
            ctx: self,
            active: true,
        }
    }

    /// The currently executing node, innermost first, or `None` outside any
    /// scope.
    pub fn current_node(&self) -> Option<String> {
        self.node_stack.blocking_lock_or_noop().last().cloned()
    }

    /// The full scoped-node stack, outermost first.
    pub fn node_stack(&self) -> Vec<String> {
        self.node_stack.blocking_lock_or_noop().clone()
    }

    /// Register a resource for disposal when [`ExecutionContext::dispose`]
    /// runs. Resources are released in LIFO order, mirroring the
    /// scoped-node stack's unwind order.
    pub async fn register_for_disposal(&self, resource: Arc<dyn Disposable>) {
        self.resources.lock().await.push(resource);
    }

    /// Convenience for one-shot creation plus registration: wraps `resource`
    /// in an `Arc`, registers it for disposal, and hands the same `Arc`
    /// back so the caller can use it for the rest of the run.
    pub async fn create_and_register<R>(&self, resource: R) -> Arc<R>
    where
        R: Disposable + 'static,
    {
        let resource = Arc::new(resource);
        self.register_for_disposal(resource.clone()).await;
        resource
    }

    /// Release every registered resource in LIFO order. Individual failures
    /// do not stop the sweep; all are aggregated into
    /// [`PipelineError::ContextDisposalFailed`] if any occur.
    pub async fn dispose(&self) -> Result<()> {
        let mut resources = self.resources.lock().await;
        let mut failures = Vec::new();
        while let Some(resource) = resources.pop() {
            if let Err(err) = resource.dispose().await {
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ContextDisposalFailed { failures })
        }
    }
}
