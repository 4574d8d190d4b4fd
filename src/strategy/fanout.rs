//! Fan-out / parallel strategy — bounded concurrent execution
//!
//! Multiple items are in flight at once, up to a configured degree of
//! parallelism. In `Ordered` mode a reorder buffer restores FIFO delivery
//! at the cost of head-of-line blocking on the slowest in-flight item; in
//! `Unordered` mode results are emitted as soon as they complete.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::context::ExecutionContext;
use crate::error::{PipelineError, Result};
use crate::node::Transform;
use crate::pipe::{BoxedPipe, CancellationToken};

/// Whether fan-out output preserves the input's relative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Restore FIFO order via a reorder buffer.
    Ordered,
    /// Emit results as soon as they're ready; order is unspecified.
    Unordered,
}

/// Runs a [`Transform`] over an input pipe with up to `parallelism` calls
/// concurrently in flight.
pub struct FanOutStrategy<Tf> {
    node_id: String,
    transform: Arc<Tf>,
    parallelism: usize,
    ordering: OrderingMode,
}

impl<Tf> FanOutStrategy<Tf>
where
    Tf: Transform + 'static,
{
    /// Build a fan-out strategy. `parallelism` of `0` is treated as `1`.
    pub fn new(node_id: impl Into<String>, transform: Arc<Tf>, parallelism: usize, ordering: OrderingMode) -> Self {
        Self {
            node_id: node_id.into(),
            transform,
            parallelism: parallelism.max(1),
            ordering,
        }
    }

    /// Wrap `input`, returning a pipe that drains it with bounded
    /// concurrency. Both modes start a background driver task eagerly, so
    /// `cancel` must be the token the run will actually use (a fresh or
    /// later-substituted token will not reach in-flight work).
    pub fn apply(self, input: BoxedPipe<Tf::Input>, context: Arc<ExecutionContext>, cancel: CancellationToken) -> BoxedPipe<Tf::Output> {
        match self.ordering {
            OrderingMode::Unordered => self.apply_unordered(input, context, cancel),
            OrderingMode::Ordered => self.apply_ordered(input, context, cancel),
        }
    }

    fn apply_unordered(self, input: BoxedPipe<Tf::Input>, context: Arc<ExecutionContext>, cancel: CancellationToken) -> BoxedPipe<Tf::Output> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Tf::Output>>();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let node_id = self.node_id.clone();
        let transform = self.transform.clone();
        let input = Arc::new(tokio::sync::Mutex::new(input));

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let item = {
                    let mut guard = input.lock().await;
                    guard.next(&cancel).await
                };
                let item = match item {
                    Ok(Some(item)) => item,
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                };
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let transform = transform.clone();
                let context = context.clone();
                let node_id = node_id.clone();
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _scope = context.push_node(node_id.clone());
                    let result = transform
                        .execute(item, &context, &cancel)
                        .await
                        .map_err(|err| PipelineError::node_execution(node_id, err));
                    let _ = tx.send(result);
                    drop(permit);
                });
            }
        });

        Box::new(ChannelPipe {
            rx,
            name: format!("{}-fanout-unordered", self.node_id),
        })
    }

    fn apply_ordered(self, input: BoxedPipe<Tf::Input>, context: Arc<ExecutionContext>, cancel: CancellationToken) -> BoxedPipe<Tf::Output> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<(u64, Result<Tf::Output>)>();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let node_id = self.node_id.clone();
        let transform = self.transform.clone();
        let input = Arc::new(tokio::sync::Mutex::new(input));
        let next_sequence = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let item = {
                    let mut guard = input.lock().await;
                    guard.next(&cancel).await
                };
                let item = match item {
                    Ok(Some(item)) => item,
                    Ok(None) => break,
                    Err(err) => {
                        let seq = next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
                        let _ = tx.send((seq, Err(err)));
                        break;
                    }
                };
                let seq = next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let transform = transform.clone();
                let context = context.clone();
                let node_id = node_id.clone();
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _scope = context.push_node(node_id.clone());
                    let result = transform
                        .execute(item, &context, &cancel)
                        .await
                        .map_err(|err| PipelineError::node_execution(node_id, err));
                    let _ = tx.send((seq, result));
                    drop(permit);
                });
            }
        });

        Box::new(ReorderPipe {
            rx,
            pending: std::collections::BTreeMap::new(),
            next_to_emit: 0,
            name: format!("{}-fanout-ordered", self.node_id),
        })
    }
}

struct ChannelPipe<T> {
    rx: tokio::sync::mpsc::UnboundedReceiver<Result<T>>,
    name: String,
}

#[async_trait::async_trait]
impl<T: Send> crate::pipe::Pipe<T> for ChannelPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Buffers out-of-order `(sequence, result)` pairs from the channel until
/// the next expected sequence number is available.
struct ReorderPipe<T> {
    rx: tokio::sync::mpsc::UnboundedReceiver<(u64, Result<T>)>,
    pending: std::collections::BTreeMap<u64, Result<T>>,
    next_to_emit: u64,
    name: String,
}

#[async_trait::async_trait]
impl<T: Send> crate::pipe::Pipe<T> for ReorderPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(result) = self.pending.remove(&self.next_to_emit) {
                self.next_to_emit += 1;
                return result.map(Some);
            }
            match self.rx.recv().await {
                Some((seq, result)) => {
                    self.pending.insert(seq, result);
                }
                None => return Ok(None),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
