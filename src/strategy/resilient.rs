//! Resilient strategy — wraps another strategy with restart, replay, and
//! circuit-breaker integration
//!
//! Given a `build` function that turns an input pipe into the inner
//! strategy's output pipe, this strategy intercepts every error surfaced
//! through iteration. Before each attempt it asks the circuit breaker
//! (if configured) whether the call may proceed at all; on a node-level
//! failure it consults the pipeline error handler for
//! [`PipelineErrorDecision::RestartNode`] (rebuild from scratch, consuming
//! restart budget and a retry delay), `ContinueWithoutNode` (end the
//! node's output gracefully), or `FailPipeline` (propagate). A successful
//! item resets the consecutive-failure counter and, from `HalfOpen`,
//! closes the breaker.
//!
//! Restarting requires the input to be replayable; the input is
//! transparently wrapped in a [`crate::pipe::replay::CappedReplayPipe`] so
//! even a streaming source can be rebuilt after a restart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::handlers::{PipelineErrorDecision, PipelineErrorHandler};
use crate::pipe::replay::CappedReplayPipe;
use crate::pipe::{BoxedPipe, CancellationToken, NextFn, Pipe, StreamingPipe};
use crate::resilience::{CircuitBreakerManager, RetryOptions};
use crate::runner::RunCounters;

/// A function that builds the wrapped strategy's output pipe from an input
/// pipe. Called once initially and again on every `RestartNode` decision.
pub type BuildFn<In, Out> = Arc<dyn Fn(BoxedPipe<In>) -> BoxedPipe<Out> + Send + Sync>;

/// A shared, restartable handle onto a [`CappedReplayPipe`]; the resilient
/// strategy hands clones of this to the wrapped `build` function so the
/// same buffered/replayed sequence is observed on every rebuild rather than
/// double-buffering.
struct ReplayHandle<In>(Arc<tokio::sync::Mutex<CappedReplayPipe<In>>>);

impl<In> Clone for ReplayHandle<In> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[async_trait]
impl<In: Send + Sync + Clone + 'static> Pipe<In> for ReplayHandle<In> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<In>> {
        self.0.lock().await.next(cancel).await
    }

    fn name(&self) -> &str {
        "resilient-replay-handle"
    }

    fn is_restartable(&self) -> bool {
        true
    }

    async fn restart(&mut self) -> Result<()> {
        self.0.lock().await.restart().await
    }
}

struct ResilientState<In, Out> {
    replay_input: ReplayHandle<In>,
    current: Option<BoxedPipe<Out>>,
    restarts: u32,
    last_delay: Option<Duration>,
}

/// Wraps another strategy with restart/replay and circuit-breaker
/// integration.
pub struct ResilientStrategy<In, Out> {
    node_id: String,
    build: BuildFn<In, Out>,
    pipeline_error_handler: Arc<dyn PipelineErrorHandler>,
    retry_options: RetryOptions,
    breaker: Option<Arc<CircuitBreakerManager>>,
    materialization_cap: Option<usize>,
    counters: Option<Arc<RunCounters>>,
}

impl<In: Send + Sync + Clone + 'static, Out: Send + 'static> ResilientStrategy<In, Out> {
    /// Build a resilient strategy. `breaker` of `None` disables circuit
    /// breaker integration entirely, matching spec.md §4.8's "when
    /// disabled or absent, resilience proceeds without breaker
    /// integration."
    pub fn new(
        node_id: impl Into<String>,
        build: BuildFn<In, Out>,
        pipeline_error_handler: Arc<dyn PipelineErrorHandler>,
        retry_options: RetryOptions,
        breaker: Option<Arc<CircuitBreakerManager>>,
        materialization_cap: Option<usize>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            build,
            pipeline_error_handler,
            retry_options,
            breaker,
            materialization_cap,
            counters: None,
        }
    }

    /// Attach a shared [`RunCounters`] so every restart, recovery, and
    /// (indirectly, via the wrapped strategy) dead-lettered item this
    /// strategy observes is reflected in the run's terminal diagnostics.
    pub fn with_counters(mut self, counters: Arc<RunCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Wrap `input`, returning a pipe that restarts the inner strategy on
    /// recoverable failures.
    pub fn apply(self, input: BoxedPipe<In>) -> BoxedPipe<Out> {
        let node_id = self.node_id.clone();
        let replay_input = ReplayHandle(Arc::new(tokio::sync::Mutex::new(CappedReplayPipe::new(
            node_id.clone(),
            input,
            self.materialization_cap,
        ))));
        let state = Arc::new(tokio::sync::Mutex::new(ResilientState {
            replay_input,
            current: None,
            restarts: 0,
            last_delay: None,
        }));

        let build = self.build;
        let pipeline_error_handler = self.pipeline_error_handler;
        let retry_options = Arc::new(self.retry_options);
        let breaker = self.breaker;
        let counters = self.counters;

        let next_fn: NextFn<Out> = Box::new(move |cancel: &CancellationToken| {
            let cancel = cancel.clone();
            let node_id = node_id.clone();
            let build = build.clone();
            let pipeline_error_handler = pipeline_error_handler.clone();
            let breaker = breaker.clone();
            let state = state.clone();
            let retry_options = retry_options.clone();
            let counters = counters.clone();
            let max_restarts = retry_options.max_node_restart_attempts;

            Box::pin(async move {
                loop {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }

                    if let Some(breaker) = &breaker {
                        if !breaker.allow_call(&node_id).await {
                            return Err(PipelineError::CircuitOpen { node: node_id.clone() });
                        }
                    }

                    let mut state = state.lock().await;
                    if state.current.is_none() {
                        let replay_box: BoxedPipe<In> = Box::new(state.replay_input.clone());
                        state.current = Some((build)(replay_box));
                    }
                    let pipe = state.current.as_mut().unwrap();
                    let outcome = pipe.next(&cancel).await;
                    match outcome {
                        Ok(item) => {
                            if let Some(breaker) = &breaker {
                                breaker.record(&node_id, true).await;
                            }
                            if item.is_some() {
                                if let Some(counters) = &counters {
                                    counters.record_success();
                                }
                            }
                            return Ok(item);
                        }
                        Err(err) => {
                            if err.is_cancellation() {
                                return Ok(None);
                            }
                            if let Some(breaker) = &breaker {
                                breaker.record(&node_id, false).await;
                            }
                            let decision = pipeline_error_handler.handle(&node_id, &err).await;
                            match decision {
                                PipelineErrorDecision::ContinueWithoutNode => {
                                    state.restarts = 0;
                                    state.current = None;
                                    return Ok(None);
                                }
                                PipelineErrorDecision::FailPipeline => {
                                    return Err(err);
                                }
                                PipelineErrorDecision::RestartNode => {
                                    if state.restarts >= max_restarts {
                                        return Err(PipelineError::retry_exhausted(
                                            node_id.clone(),
                                            state.restarts,
                                            err,
                                        ));
                                    }
                                    state.restarts += 1;
                                    if let Some(counters) = &counters {
                                        counters.record_failure();
                                    }
                                    let delay = retry_options.delay_for(state.restarts - 1, state.last_delay);
                                    state.last_delay = Some(delay);
                                    state.replay_input.restart().await?;
                                    state.current = None;
                                    drop(state);
                                    if !delay.is_zero() {
                                        tokio::time::sleep(delay).await;
                                    }
                                    continue;
                                }
                            }
                        }
                    }
                }
            })
        });

        Box::new(StreamingPipe::new(format!("{}-resilient", self.node_id), next_fn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::FailFast;
    use crate::pipe::{CancellationSource, MaterializedPipe};
    use crate::resilience::retry::Fixed;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RestartTwice(Arc<AtomicU32>);

    #[async_trait]
    impl PipelineErrorHandler for RestartTwice {
        async fn handle(&self, _node: &str, _error: &PipelineError) -> PipelineErrorDecision {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                PipelineErrorDecision::RestartNode
            } else {
                PipelineErrorDecision::FailPipeline
            }
        }
    }

    fn flaky_build(fail_first_n: Arc<AtomicU32>) -> BuildFn<i32, i32> {
        Arc::new(move |input: BoxedPipe<i32>| -> BoxedPipe<i32> {
            let fail_first_n = fail_first_n.clone();
            let input = std::sync::Arc::new(tokio::sync::Mutex::new(input));
            let next_fn: NextFn<i32> = Box::new(move |cancel: &CancellationToken| {
                let cancel = cancel.clone();
                let input = input.clone();
                let fail_first_n = fail_first_n.clone();
                Box::pin(async move {
                    if fail_first_n.load(Ordering::SeqCst) > 0 {
                        fail_first_n.fetch_sub(1, Ordering::SeqCst);
                        return Err(PipelineError::node_execution(
                            "flaky",
                            std::io::Error::new(std::io::ErrorKind::Other, "transient"),
                        ));
                    }
                    input.lock().await.next(&cancel).await
                })
            });
            Box::new(StreamingPipe::new("flaky-inner", next_fn))
        })
    }

    #[tokio::test]
    async fn restarts_until_budget_then_succeeds() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1, 2, 3]));
        let fail_first_n = Arc::new(AtomicU32::new(2));
        let handler_calls = Arc::new(AtomicU32::new(0));
        let retry_options = RetryOptions {
            max_node_restart_attempts: 3,
            max_item_retry_attempts: 0,
            delay_strategy: Box::new(Fixed::new(Duration::from_millis(0))),
            max_delay: Duration::from_millis(0),
        };
        let strategy = ResilientStrategy::new(
            "node",
            flaky_build(fail_first_n),
            Arc::new(RestartTwice(handler_calls)),
            retry_options,
            None,
            None,
        );
        let mut output = strategy.apply(input);
        assert_eq!(output.next(&cancel).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn exhausted_budget_fails_with_retry_exhausted() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1]));
        let fail_first_n = Arc::new(AtomicU32::new(100));
        let retry_options = RetryOptions {
            max_node_restart_attempts: 1,
            max_item_retry_attempts: 0,
            delay_strategy: Box::new(Fixed::new(Duration::from_millis(0))),
            max_delay: Duration::from_millis(0),
        };
        let strategy = ResilientStrategy::new(
            "node",
            flaky_build(fail_first_n),
            Arc::new(RestartTwice(Arc::new(AtomicU32::new(0)))),
            retry_options,
            None,
            None,
        );
        let mut output = strategy.apply(input);
        let err = output.next(&cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::RetryExhausted { .. }));
    }

    #[tokio::test]
    async fn fail_fast_propagates_immediately() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1]));
        let fail_first_n = Arc::new(AtomicU32::new(100));
        let retry_options = RetryOptions::default();
        let strategy = ResilientStrategy::new(
            "node",
            flaky_build(fail_first_n),
            Arc::new(FailFast),
            retry_options,
            None,
            None,
        );
        let mut output = strategy.apply(input);
        let err = output.next(&cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::NodeExecution { .. }));
    }
}
