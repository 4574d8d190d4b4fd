//! Error handlers — node-level and pipeline-level recovery decisions
//!
//! Two distinct decision points exist, per spec.md §7:
//!
//! - A [`NodeErrorHandler`] is consulted immediately when a node's
//!   execution raises, for that one item. It decides whether to skip the
//!   item, route it to the dead-letter sink, retry it in place, or let the
//!   failure propagate.
//! - A [`PipelineErrorHandler`] is consulted by the resilient strategy only
//!   once a node's failures have *not* been recovered at the item level
//!   (the decision was `Fail`, or there was no node handler at all). It
//!   decides whether to restart the whole node, continue the run without
//!   it, or fail the pipeline outright.

use async_trait::async_trait;

use crate::error::{BoxedSource, PipelineError, Result};

/// What to do about a single item that failed inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeErrorDecision {
    /// Drop the item silently.
    Skip,
    /// Route the item to the node's configured dead-letter sink.
    DeadLetter,
    /// Retry the item in place, consuming one unit of the node's per-item
    /// retry budget.
    Retry,
    /// Let the failure propagate to the pipeline error handler.
    Fail,
}

/// What to do about a node that has exhausted its item-level recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorDecision {
    /// Restart the node from scratch, consuming one unit of the node's
    /// restart budget.
    RestartNode,
    /// Drop the node from the run; its downstream consumers see an empty
    /// input. Per spec.md §9, restart/failure counters reset when this
    /// decision is taken.
    ContinueWithoutNode,
    /// Fail the whole run.
    FailPipeline,
}

/// Consulted per failing item, inside a node's execution.
#[async_trait]
pub trait NodeErrorHandler: Send + Sync {
    /// Decide what to do about `error` raised by `node`.
    async fn handle(&self, node: &str, error: &BoxedSource) -> NodeErrorDecision;
}

/// Consulted once a node's item-level recovery has been exhausted or
/// declined.
#[async_trait]
pub trait PipelineErrorHandler: Send + Sync {
    /// Decide what to do about `node` having failed outright.
    async fn handle(&self, node: &str, error: &PipelineError) -> PipelineErrorDecision;
}

/// Receives items that a [`NodeErrorHandler`] routed to `DeadLetter`.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Accept one dead-lettered item's serialized representation and the
    /// error that caused it to be routed here. Returns
    /// [`PipelineError::ResourceExhausted`] if the sink is at capacity.
    async fn accept(&self, node: &str, payload: String, error: &BoxedSource) -> Result<()>;
}

/// Always fails — the default when no pipeline handler is configured,
/// matching spec.md's "no handler configured" fallback of failing the run.
pub struct FailFast;

#[async_trait]
impl PipelineErrorHandler for FailFast {
    async fn handle(&self, _node: &str, _error: &PipelineError) -> PipelineErrorDecision {
        PipelineErrorDecision::FailPipeline
    }
}

/// Always fails at the item level — the default when no node handler is
/// configured.
pub struct AlwaysFail;

#[async_trait]
impl NodeErrorHandler for AlwaysFail {
    async fn handle(&self, _node: &str, _error: &BoxedSource) -> NodeErrorDecision {
        NodeErrorDecision::Fail
    }
}

/// Bounded in-memory dead-letter sink. Raises
/// [`PipelineError::ResourceExhausted`] once `capacity` items have been
/// accepted without being drained via [`InMemoryDeadLetterSink::drain`].
pub struct InMemoryDeadLetterSink {
    capacity: usize,
    items: tokio::sync::Mutex<Vec<(String, String)>>,
}

impl InMemoryDeadLetterSink {
    /// Build a sink bounded at `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Remove and return every buffered item.
    pub async fn drain(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.items.lock().await)
    }

    /// Number of items currently buffered.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether the sink currently holds no items.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn accept(&self, node: &str, payload: String, _error: &BoxedSource) -> Result<()> {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            return Err(PipelineError::ResourceExhausted {
                node: node.to_string(),
                kind: crate::error::ExhaustionKind::DeadLetterOverflow,
            });
        }
        items.push((node.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn boxed_err() -> BoxedSource {
        Box::new(io::Error::new(io::ErrorKind::Other, "boom"))
    }

    #[tokio::test]
    async fn fail_fast_always_fails_pipeline() {
        let handler = FailFast;
        let decision = handler.handle("n1", &PipelineError::Cancelled).await;
        assert_eq!(decision, PipelineErrorDecision::FailPipeline);
    }

    #[tokio::test]
    async fn dead_letter_sink_rejects_past_capacity() {
        let sink = InMemoryDeadLetterSink::new(1);
        sink.accept("n1", "item-1".into(), &boxed_err()).await.unwrap();
        let err = sink.accept("n1", "item-2".into(), &boxed_err()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ResourceExhausted { .. }));
    }

    #[tokio::test]
    async fn dead_letter_sink_drain_empties_buffer() {
        let sink = InMemoryDeadLetterSink::new(10);
        sink.accept("n1", "item-1".into(), &boxed_err()).await.unwrap();
        assert_eq!(sink.len().await, 1);
        let drained = sink.drain().await;
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty().await);
    }
}
