//! Batching strategy — group items by size or time window
//!
//! Buffers input items until either the size limit is reached or the time
//! window elapses since the last emission, then emits a `Vec<T>`. Emits a
//! final partial batch when the source completes. The time-based flush is
//! opportunistic: it is only checked as each input item arrives (or as the
//! source reports exhaustion), so a purely idle upstream never triggers an
//! emission on its own — matching spec.md §4.6's explicit carve-out.

use std::time::{Duration, Instant};

use crate::pipe::{BoxedPipe, CancellationToken, NextFn, StreamingPipe};

/// Buffers items into `Vec<T>` batches.
pub struct BatchingStrategy {
    node_id: String,
    size: usize,
    window: Option<Duration>,
}

impl BatchingStrategy {
    /// Build a batching strategy. `size` of `0` is treated as `1` (every
    /// item is its own batch). `window` of `None` disables time-based
    /// flushing entirely.
    pub fn new(node_id: impl Into<String>, size: usize, window: Option<Duration>) -> Self {
        Self {
            node_id: node_id.into(),
            size: size.max(1),
            window,
        }
    }

    /// Wrap `input`, returning a pipe of `Vec<T>` batches.
    pub fn apply<T: Send + 'static>(self, input: BoxedPipe<T>) -> BoxedPipe<Vec<T>> {
        let size = self.size;
        let window = self.window;
        let input = std::sync::Arc::new(tokio::sync::Mutex::new(input));
        let state = std::sync::Arc::new(tokio::sync::Mutex::new(BatchState {
            buffer: Vec::new(),
            window_start: None,
            upstream_done: false,
        }));

        let next_fn: NextFn<Vec<T>> = Box::new(move |cancel: &CancellationToken| {
            let cancel = cancel.clone();
            let input = input.clone();
            let state = state.clone();
            Box::pin(async move {
                let mut state = state.lock().await;
                loop {
                    if state.upstream_done {
                        if state.buffer.is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(std::mem::take(&mut state.buffer)));
                    }
                    if cancel.is_cancelled() {
                        if state.buffer.is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(std::mem::take(&mut state.buffer)));
                    }

                    let mut guard = input.lock().await;
                    let item = guard.next(&cancel).await?;
                    drop(guard);

                    match item {
                        None => {
                            state.upstream_done = true;
                            continue;
                        }
                        Some(item) => {
                            if state.buffer.is_empty() {
                                state.window_start = Some(Instant::now());
                            }
                            state.buffer.push(item);

                            let size_hit = state.buffer.len() >= size;
                            let window_hit = match (window, state.window_start) {
                                (Some(w), Some(start)) => start.elapsed() >= w,
                                _ => false,
                            };

                            if size_hit || window_hit {
                                state.window_start = None;
                                return Ok(Some(std::mem::take(&mut state.buffer)));
                            }
                        }
                    }
                }
            })
        });

        Box::new(StreamingPipe::new(format!("{}-batched", self.node_id), next_fn))
    }
}

struct BatchState<T> {
    buffer: Vec<T>,
    window_start: Option<Instant>,
    upstream_done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{CancellationSource, MaterializedPipe};

    #[tokio::test]
    async fn emits_full_batches_then_a_final_partial_one() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1, 2, 3, 4, 5]));
        let strategy = BatchingStrategy::new("batcher", 2, None);
        let mut output = strategy.apply(input);
        let mut batches = Vec::new();
        while let Some(batch) = output.next(&cancel).await.unwrap() {
            batches.push(batch);
        }
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn idle_upstream_never_flushes_on_its_own() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1]));
        let strategy = BatchingStrategy::new("batcher", 10, Some(Duration::from_millis(1)));
        let mut output = strategy.apply(input);
        // Only one item ever arrives; the time window elapsing with nothing
        // new arriving must not spuriously emit more than once.
        let first = output.next(&cancel).await.unwrap();
        assert_eq!(first, Some(vec![1]));
        assert_eq!(output.next(&cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn time_window_flushes_before_size_limit() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", vec![1, 2]));
        let strategy = BatchingStrategy::new("batcher", 100, Some(Duration::from_millis(0)));
        let mut output = strategy.apply(input);
        let batch = output.next(&cancel).await.unwrap();
        assert_eq!(batch, Some(vec![1]));
    }
}
