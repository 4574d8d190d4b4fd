//! Observability wiring — the typed event surface consumed by metrics and
//! queue-depth monitors
//!
//! Distinct from `tracing`, which this crate uses throughout for
//! human-facing diagnostics: the [`Observer`] trait and [`ObserverEvent`]
//! enum are a structured, low-cardinality feed meant for counters and
//! gauges, not logs. A host application implements [`Observer`] once and
//! wires it into [`crate::context::ExecutionContext`] (or, for simple
//! cases, composes several via [`CompositeObserver`]).

use async_trait::async_trait;
use std::time::Duration;

/// A structured lifecycle or resource event, emitted at well-defined points
/// during a run.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A node began processing one item (or, for batch-oriented strategies,
    /// one batch).
    NodeStarted {
        /// Node that started.
        node: String,
    },
    /// A node finished processing, successfully or not.
    NodeCompleted {
        /// Node that completed.
        node: String,
        /// How long the invocation took.
        duration: Duration,
        /// Whether it succeeded.
        success: bool,
    },
    /// A retry attempt is about to be made.
    Retry {
        /// Node being retried.
        node: String,
        /// 0-indexed attempt number about to be made.
        attempt: u32,
        /// Delay being waited before the attempt.
        delay: Duration,
    },
    /// An item was dropped from a bounded queue (merge interleave buffer,
    /// dead-letter overflow) rather than delivered.
    QueueDrop {
        /// Node that owns the queue.
        node: String,
        /// Why the item was dropped.
        reason: String,
    },
    /// Periodic queue depth sample, for backpressure monitoring.
    QueueMetrics {
        /// Node that owns the queue.
        node: String,
        /// Items currently buffered.
        depth: usize,
        /// Configured capacity, if bounded.
        capacity: Option<usize>,
    },
}

/// Receives [`ObserverEvent`]s as a run progresses. Implementations must
/// not block — this is called from hot paths inside every strategy.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Handle one event. Must return promptly.
    async fn observe(&self, event: ObserverEvent);
}

/// Discards every event. The default when no observer is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

#[async_trait]
impl Observer for NullObserver {
    async fn observe(&self, _event: ObserverEvent) {}
}

/// Fans a single event out to every observer in the list, in order.
pub struct CompositeObserver {
    observers: Vec<Box<dyn Observer>>,
}

impl CompositeObserver {
    /// Build a composite from a list of observers.
    pub fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl Observer for CompositeObserver {
    async fn observe(&self, event: ObserverEvent) {
        for observer in &self.observers {
            observer.observe(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingObserver(Arc<AtomicUsize>);

    #[async_trait]
    impl Observer for CountingObserver {
        async fn observe(&self, _event: ObserverEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn composite_fans_out_to_all_observers() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let composite = CompositeObserver::new(vec![
            Box::new(CountingObserver(a.clone())),
            Box::new(CountingObserver(b.clone())),
        ]);
        composite
            .observe(ObserverEvent::NodeStarted { node: "n1".into() })
            .await;
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn null_observer_is_a_no_op() {
        let observer = NullObserver;
        observer
            .observe(ObserverEvent::QueueMetrics {
                node: "n1".into(),
                depth: 0,
                capacity: None,
            })
            .await;
    }
}
