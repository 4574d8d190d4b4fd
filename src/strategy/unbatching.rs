//! Unbatching strategy — flatten a sequence of collections back to items
//!
//! The mirror image of [`crate::strategy::batching::BatchingStrategy`]:
//! asserts its input is a sequence of `Vec<T>` and emits each element in
//! order. Must be paired with an upstream batching strategy (or any
//! producer of `Vec<T>`); there is no type-level way to enforce that
//! pairing in a dynamically-composed graph, so a node declared as
//! `Unbatching` whose upstream output type is not a collection is instead
//! caught by [`crate::graph::validator::TypeRule`] at graph-build time.

use crate::pipe::{BoxedPipe, CancellationToken, NextFn, StreamingPipe};

/// Flattens `Vec<T>` batches back into individual `T` items.
pub struct UnbatchingStrategy {
    node_id: String,
}

impl UnbatchingStrategy {
    /// Build an unbatching strategy.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into() }
    }

    /// Wrap `input`, returning a pipe of flattened items.
    pub fn apply<T: Send + 'static>(self, input: BoxedPipe<Vec<T>>) -> BoxedPipe<T> {
        let input = std::sync::Arc::new(tokio::sync::Mutex::new(input));
        let current: std::sync::Arc<tokio::sync::Mutex<std::collections::VecDeque<T>>> =
            std::sync::Arc::new(tokio::sync::Mutex::new(std::collections::VecDeque::new()));

        let next_fn: NextFn<T> = Box::new(move |cancel: &CancellationToken| {
            let cancel = cancel.clone();
            let input = input.clone();
            let current = current.clone();
            Box::pin(async move {
                loop {
                    {
                        let mut current = current.lock().await;
                        if let Some(item) = current.pop_front() {
                            return Ok(Some(item));
                        }
                    }
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let mut guard = input.lock().await;
                    let batch = guard.next(&cancel).await?;
                    drop(guard);
                    match batch {
                        None => return Ok(None),
                        Some(batch) => {
                            *current.lock().await = batch.into_iter().collect();
                        }
                    }
                }
            })
        });

        Box::new(StreamingPipe::new(format!("{}-unbatched", self.node_id), next_fn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{CancellationSource, MaterializedPipe};

    #[tokio::test]
    async fn flattens_batches_in_order() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<Vec<i32>> = Box::new(MaterializedPipe::new("batches", vec![vec![1, 2], vec![3], vec![4, 5, 6]]));
        let strategy = UnbatchingStrategy::new("unbatcher");
        let mut output = strategy.apply(input);
        let mut out = Vec::new();
        while let Some(v) = output.next(&cancel).await.unwrap() {
            out.push(v);
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn empty_batches_are_skipped_without_stalling() {
        let (_src, cancel) = CancellationSource::new();
        let input: BoxedPipe<Vec<i32>> = Box::new(MaterializedPipe::new("batches", vec![vec![], vec![1]]));
        let strategy = UnbatchingStrategy::new("unbatcher");
        let mut output = strategy.apply(input);
        assert_eq!(output.next(&cancel).await.unwrap(), Some(1));
        assert_eq!(output.next(&cancel).await.unwrap(), None);
    }
}
