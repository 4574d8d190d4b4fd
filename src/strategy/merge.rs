//! Merge strategy — fan-in at a node with multiple incoming edges
//!
//! Three modes, per spec.md §4.6:
//!
//! - [`MergeStrategy::concatenate`] drains input pipes strictly in
//!   declared order: the second source is not touched until the first is
//!   exhausted.
//! - [`MergeStrategy::interleave`] multiplexes every source through a
//!   single mailbox (bounded if a capacity is given, unbounded otherwise).
//!   Per-source FIFO is preserved; cross-source order is unspecified.
//! - [`MergeStrategy::custom`] hands the full set of source pipes to a
//!   user-provided async merge function.

use std::future::Future;
use std::pin::Pin;

use crate::pipe::{BoxedPipe, CancellationToken, NextFn, StreamingPipe};

/// Fan-in strategies over a fixed set of same-typed source pipes.
pub struct MergeStrategy;

impl MergeStrategy {
    /// Drain `sources` strictly in order: fully exhaust `sources[0]` before
    /// moving to `sources[1]`, and so on.
    pub fn concatenate<T: Send + 'static>(node_id: impl Into<String>, sources: Vec<BoxedPipe<T>>) -> BoxedPipe<T> {
        let node_id = node_id.into();
        let sources = std::sync::Arc::new(tokio::sync::Mutex::new(ConcatState {
            remaining: sources.into_iter().collect(),
        }));

        let next_fn: NextFn<T> = Box::new(move |cancel: &CancellationToken| {
            let cancel = cancel.clone();
            let sources = sources.clone();
            Box::pin(async move {
                let mut state = sources.lock().await;
                loop {
                    let Some(front) = state.remaining.front_mut() else {
                        return Ok(None);
                    };
                    match front.next(&cancel).await? {
                        Some(item) => return Ok(Some(item)),
                        None => {
                            state.remaining.pop_front();
                        }
                    }
                }
            })
        });

        Box::new(StreamingPipe::new(format!("{node_id}-merge-concatenate"), next_fn))
    }

    /// Multiplex `sources` through a mailbox of `capacity` (unbounded if
    /// `None`). Every source is pulled concurrently by a background task;
    /// per-source order is preserved but interleaving across sources is
    /// not deterministic.
    pub fn interleave<T: Send + 'static>(
        node_id: impl Into<String>,
        sources: Vec<BoxedPipe<T>>,
        capacity: Option<usize>,
        cancel: CancellationToken,
    ) -> BoxedPipe<T> {
        let node_id = node_id.into();
        match capacity {
            Some(cap) => {
                let (tx, rx) = tokio::sync::mpsc::channel::<T>(cap.max(1));
                for mut source in sources {
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        while let Ok(Some(item)) = source.next(&cancel).await {
                            if cancel.is_cancelled() || tx.send(item).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                drop(tx);
                Box::new(BoundedChannelPipe {
                    rx,
                    name: format!("{node_id}-merge-interleave"),
                })
            }
            None => {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<T>();
                for mut source in sources {
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        while let Ok(Some(item)) = source.next(&cancel).await {
                            if cancel.is_cancelled() || tx.send(item).is_err() {
                                break;
                            }
                        }
                    });
                }
                drop(tx);
                Box::new(UnboundedChannelPipe {
                    rx,
                    name: format!("{node_id}-merge-interleave"),
                })
            }
        }
    }

    /// Hand the full set of source pipes to a user-provided merge function,
    /// which returns the merged output pipe directly.
    pub fn custom<T: Send + 'static>(
        sources: Vec<BoxedPipe<T>>,
        merge_fn: Box<dyn FnOnce(Vec<BoxedPipe<T>>) -> BoxedPipe<T> + Send>,
    ) -> BoxedPipe<T> {
        merge_fn(sources)
    }
}

struct ConcatState<T> {
    remaining: std::collections::VecDeque<BoxedPipe<T>>,
}

struct BoundedChannelPipe<T> {
    rx: tokio::sync::mpsc::Receiver<T>,
    name: String,
}

#[async_trait::async_trait]
impl<T: Send> crate::pipe::Pipe<T> for BoundedChannelPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> crate::error::Result<Option<T>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct UnboundedChannelPipe<T> {
    rx: tokio::sync::mpsc::UnboundedReceiver<T>,
    name: String,
}

#[async_trait::async_trait]
impl<T: Send> crate::pipe::Pipe<T> for UnboundedChannelPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> crate::error::Result<Option<T>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Type alias documenting the shape a [`MergeStrategy::custom`] merge
/// function's inner future would take, for implementers composing one from
/// an async block rather than a plain synchronous closure.
pub type AsyncMergeFuture<T> = Pin<Box<dyn Future<Output = BoxedPipe<T>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{CancellationSource, MaterializedPipe};

    #[tokio::test]
    async fn concatenate_drains_sources_strictly_in_order() {
        let (_src, cancel) = CancellationSource::new();
        let a: BoxedPipe<i32> = Box::new(MaterializedPipe::new("a", vec![1, 2, 3]));
        let b: BoxedPipe<i32> = Box::new(MaterializedPipe::new("b", vec![4, 5]));
        let mut merged = MergeStrategy::concatenate("merge", vec![a, b]);
        let mut out = Vec::new();
        while let Some(v) = merged.next(&cancel).await.unwrap() {
            out.push(v);
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn interleave_preserves_per_source_order() {
        let (_src, cancel) = CancellationSource::new();
        let a: BoxedPipe<i32> = Box::new(MaterializedPipe::new("a", vec![1, 2, 3]));
        let b: BoxedPipe<i32> = Box::new(MaterializedPipe::new("b", vec![10, 20]));
        let mut merged = MergeStrategy::interleave("merge", vec![a, b], Some(1), cancel.clone());
        let mut out = Vec::new();
        while let Some(v) = merged.next(&cancel).await.unwrap() {
            out.push(v);
        }
        out.sort();
        assert_eq!(out.len(), 5);
        let from_a: Vec<_> = out.iter().filter(|v| **v < 10).copied().collect();
        let from_b: Vec<_> = out.iter().filter(|v| **v >= 10).copied().collect();
        assert_eq!(from_a, vec![1, 2, 3]);
        assert_eq!(from_b, vec![10, 20]);
    }

    #[tokio::test]
    async fn custom_merge_delegates_entirely() {
        let a: BoxedPipe<i32> = Box::new(MaterializedPipe::new("a", vec![1]));
        let b: BoxedPipe<i32> = Box::new(MaterializedPipe::new("b", vec![2]));
        let (_src, cancel) = CancellationSource::new();
        let merged = MergeStrategy::custom(
            vec![a, b],
            Box::new(|mut sources| {
                let second = sources.pop().unwrap();
                let _first = sources.pop().unwrap();
                second
            }),
        );
        let mut merged = merged;
        assert_eq!(merged.next(&cancel).await.unwrap(), Some(2));
    }
}
