//! Sequential strategy — single-threaded cooperative draining
//!
//! Per-item flow, matching spec.md §4.6: push the node's scope, call the
//! transform, and on failure consult the node's error handler before
//! deciding whether to skip, dead-letter, retry in place, or let the
//! failure propagate to the strategy layer (and from there to the
//! resilient strategy, if one wraps this).

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{BoxedSource, PipelineError, Result};
use crate::handlers::{DeadLetterSink, NodeErrorDecision, NodeErrorHandler};
use crate::node::Transform;
use crate::pipe::{BoxedPipe, CancellationToken, NextFn, StreamingPipe};
use crate::runner::RunCounters;

/// Applies a [`Transform`] to every item of an input pipe, one at a time.
pub struct SequentialStrategy<Tf> {
    node_id: String,
    transform: Arc<Tf>,
    error_handler: Arc<dyn NodeErrorHandler>,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    max_item_retries: u32,
    counters: Option<Arc<RunCounters>>,
}

impl<Tf> SequentialStrategy<Tf>
where
    Tf: Transform + 'static,
    Tf::Input: Clone + std::fmt::Debug,
{
    /// Build a sequential strategy around `transform`, consulting
    /// `error_handler` on every failure and routing `DeadLetter` decisions
    /// to `dead_letter` if present.
    pub fn new(
        node_id: impl Into<String>,
        transform: Arc<Tf>,
        error_handler: Arc<dyn NodeErrorHandler>,
        dead_letter: Option<Arc<dyn DeadLetterSink>>,
        max_item_retries: u32,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            transform,
            error_handler,
            dead_letter,
            max_item_retries,
            counters: None,
        }
    }

    /// Attach a shared [`RunCounters`] so items routed to the dead-letter
    /// sink are reflected in the run's terminal diagnostics.
    pub fn with_counters(mut self, counters: Arc<RunCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Wrap `input`, returning a pipe that drains it through the transform.
    pub fn apply(self, input: BoxedPipe<Tf::Input>, context: Arc<ExecutionContext>) -> BoxedPipe<Tf::Output> {
        let node_id = self.node_id.clone();
        let transform = self.transform;
        let error_handler = self.error_handler;
        let dead_letter = self.dead_letter;
        let max_item_retries = self.max_item_retries;
        let counters = self.counters;
        let input = Arc::new(tokio::sync::Mutex::new(input));

        let next_fn: NextFn<Tf::Output> = Box::new(move |cancel: &CancellationToken| {
            let cancel = cancel.clone();
            let node_id = node_id.clone();
            let transform = transform.clone();
            let error_handler = error_handler.clone();
            let dead_letter = dead_letter.clone();
            let counters = counters.clone();
            let context = context.clone();
            let input = input.clone();
            Box::pin(async move {
                let mut input = input.lock().await;
                loop {
                    let Some(item) = input.next(&cancel).await? else {
                        return Ok(None);
                    };
                    let _scope = context.push_node(node_id.clone());
                    let mut attempts: u32 = 0;
                    let mut current = item;
                    loop {
                        match transform.execute(current.clone(), &context, &cancel).await {
                            Ok(output) => return Ok(Some(output)),
                            Err(err) => {
                                let boxed_err: BoxedSource = Box::new(err);
                                let decision = error_handler.handle(&node_id, &boxed_err).await;
                                match decision {
                                    NodeErrorDecision::Skip => break,
                                    NodeErrorDecision::DeadLetter => {
                                        if let Some(sink) = &dead_letter {
                                            sink.accept(&node_id, format!("{current:?}"), &boxed_err).await?;
                                            if let Some(counters) = &counters {
                                                counters.record_dead_letter();
                                            }
                                        }
                                        break;
                                    }
                                    NodeErrorDecision::Retry => {
                                        attempts += 1;
                                        if attempts > max_item_retries {
                                            return Err(PipelineError::node_execution(node_id.clone(), boxed_err));
                                        }
                                        continue;
                                    }
                                    NodeErrorDecision::Fail => {
                                        return Err(PipelineError::node_execution(node_id.clone(), boxed_err));
                                    }
                                }
                            }
                        }
                    }
                    // item was skipped or dead-lettered; move on to the next one
                }
            })
        });

        Box::new(StreamingPipe::new(format!("{}-sequential", self.node_id), next_fn))
    }
}
