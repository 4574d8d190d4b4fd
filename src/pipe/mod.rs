//! Data pipe — the lazy, ordered sequence of items flowing along an edge
//!
//! A [`Pipe`] is a pull-based async sequence: nothing runs until something
//! calls [`Pipe::next`]. Strategies compose pipes (wrapping an input pipe,
//! returning an output pipe); the sink at the end of a chain is the only
//! thing that actually drives iteration.
//!
//! Two flavors exist:
//!
//! - [`MaterializedPipe`] buffers its items up front and can be restarted
//!   (re-iterated from the beginning) any number of times.
//! - [`StreamingPipe`] wraps a single-shot async producer; a second
//!   enumeration attempt after completion fails (see [`StreamingPipe::restart`]).
//!   Callers that need replay after a transient downstream failure should
//!   wrap a streaming pipe in [`replay::CappedReplayPipe`] instead.
//!
//! Cancellation: an iteration interrupted by a cancelled [`CancellationToken`]
//! completes the sequence without emitting additional items and without
//! raising, unless the underlying resource itself failed.

pub mod replay;

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{PipelineError, Result};

/// Cooperative cancellation signal threaded through every suspension point
/// in the engine (pipe iteration, node invocation, retry delays, merge
/// channel reads/writes, sink calls, context disposal).
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// The sender half; held by the runner, dropped or fired when the run ends.
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// A fresh, not-yet-cancelled pair.
    pub fn new() -> (Self, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationToken { rx })
    }

    /// Signal cancellation to every token derived from this source.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    /// True once [`CancellationSource::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled; resolves immediately if it
    /// already has been.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

/// A lazy, single-consumer, possibly-restartable async sequence of items
/// plus a human-readable stream name.
///
/// Implementors only need [`Pipe::next`] and [`Pipe::name`]; `is_restartable`
/// defaults to `false` so naive implementations never silently misbehave
/// when the resilient strategy asks to rebuild them.
#[async_trait]
pub trait Pipe<T: Send>: Send {
    /// Pull the next item, or `None` once the sequence is exhausted.
    ///
    /// Must observe `cancel`: if cancellation fires mid-call, the
    /// implementation completes the sequence (returns `Ok(None)`) rather
    /// than blocking or raising, unless the underlying resource itself
    /// failed.
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>>;

    /// Human-readable name of this stream, for logging/observability.
    fn name(&self) -> &str;

    /// Whether [`Pipe::restart`] is supported. Streaming (single-shot)
    /// pipes return `false`; materialized and capped-replay pipes return
    /// `true`.
    fn is_restartable(&self) -> bool {
        false
    }

    /// Re-iterate from the start. The default implementation always fails;
    /// restartable pipes override it.
    async fn restart(&mut self) -> Result<()> {
        Err(PipelineError::GraphValidation(format!(
            "pipe '{}' is not restartable",
            self.name()
        )))
    }
}

/// Boxed, object-safe pipe handle used wherever strategies need to hold a
/// heterogeneous collection of pipes (merge inputs, fan-out outputs).
pub type BoxedPipe<T> = Box<dyn Pipe<T> + Send>;

/// A future-producing closure, used by [`StreamingPipe`] to lazily pull from
/// an arbitrary async source without naming its concrete type.
pub type NextFn<T> =
    Box<dyn FnMut(&CancellationToken) -> Pin<Box<dyn Future<Output = Result<Option<T>>> + Send>> + Send>;

/// An in-memory materialized pipe: all items are (or become, as they are
/// first produced) buffered, so [`Pipe::restart`] just rewinds a cursor.
pub struct MaterializedPipe<T> {
    name: String,
    items: Vec<T>,
    cursor: usize,
}

impl<T: Clone + Send> MaterializedPipe<T> {
    /// Build from an already-collected vector of items.
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items,
            cursor: 0,
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Pipe<T> for MaterializedPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        if cancel.is_cancelled() || self.cursor >= self.items.len() {
            return Ok(None);
        }
        let item = self.items[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(item))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_restartable(&self) -> bool {
        true
    }

    async fn restart(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Single-shot wrapper around an arbitrary async producer. A second
/// enumeration (calling [`Pipe::next`] again after exhaustion and then
/// [`Pipe::restart`]) is rejected — the caller must wrap it in
/// [`replay::CappedReplayPipe`] first if replay is needed.
pub struct StreamingPipe<T> {
    name: String,
    next_fn: Option<NextFn<T>>,
    exhausted: bool,
}

impl<T> StreamingPipe<T> {
    /// Build from a closure that produces the next item each call.
    pub fn new(name: impl Into<String>, next_fn: NextFn<T>) -> Self {
        Self {
            name: name.into(),
            next_fn: Some(next_fn),
            exhausted: false,
        }
    }
}

#[async_trait]
impl<T: Send> Pipe<T> for StreamingPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        if self.exhausted || cancel.is_cancelled() {
            return Ok(None);
        }
        let Some(next_fn) = self.next_fn.as_mut() else {
            return Ok(None);
        };
        let item = next_fn(cancel).await?;
        if item.is_none() {
            self.exhausted = true;
        }
        Ok(item)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_restartable(&self) -> bool {
        false
    }

    async fn restart(&mut self) -> Result<()> {
        Err(PipelineError::GraphValidation(format!(
            "streaming pipe '{}' does not support a second enumeration; wrap it in a capped replay pipe",
            self.name
        )))
    }
}
