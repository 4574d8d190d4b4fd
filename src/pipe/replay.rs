//! Capped replayable pipe
//!
//! Wraps another [`Pipe`] so a downstream consumer can be restarted after a
//! transient failure without re-invoking an expensive upstream (a network
//! source, a join that rebuilt its hash table, etc). Items seen so far are
//! buffered up to a configured cap; a second enumeration replays the buffer
//! first, then resumes pulling from the wrapped pipe where it left off.
//!
//! When a cap is configured, buffering happens eagerly: every item pulled
//! through this wrapper is buffered before being handed to the caller, and
//! the cap is enforced at buffer time rather than only at replay time. This
//! keeps the failure deterministic — a cap violation always surfaces on the
//! same item regardless of whether a restart was ever attempted.

use async_trait::async_trait;

use super::{CancellationToken, Pipe};
use crate::error::{ExhaustionKind, PipelineError, Result};

/// Replay wrapper around an inner pipe, bounded by an optional item cap.
pub struct CappedReplayPipe<T> {
    node: String,
    inner: Box<dyn Pipe<T> + Send>,
    cap: Option<usize>,
    buffer: Vec<T>,
    /// Position in `buffer` that the current enumeration has replayed up to.
    replay_cursor: usize,
    /// True once the inner pipe has reported exhaustion at least once.
    inner_exhausted: bool,
}

impl<T: Clone + Send> CappedReplayPipe<T> {
    /// Wrap `inner`, attributing overflow errors to `node`. `cap` of `None`
    /// means unbounded buffering (still replayable, never rejects on size).
    pub fn new(node: impl Into<String>, inner: Box<dyn Pipe<T> + Send>, cap: Option<usize>) -> Self {
        Self {
            node: node.into(),
            inner,
            cap,
            buffer: Vec::new(),
            replay_cursor: 0,
            inner_exhausted: false,
        }
    }

    /// Items buffered so far, for diagnostics and tests.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Pipe<T> for CappedReplayPipe<T> {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        if self.replay_cursor < self.buffer.len() {
            let item = self.buffer[self.replay_cursor].clone();
            self.replay_cursor += 1;
            return Ok(Some(item));
        }

        if self.inner_exhausted {
            return Ok(None);
        }

        match self.inner.next(cancel).await? {
            Some(item) => {
                if let Some(cap) = self.cap {
                    if self.buffer.len() >= cap {
                        return Err(PipelineError::ResourceExhausted {
                            node: self.node.clone(),
                            kind: ExhaustionKind::MaterializationCapExceeded,
                        });
                    }
                }
                self.buffer.push(item.clone());
                self.replay_cursor = self.buffer.len();
                Ok(Some(item))
            }
            None => {
                self.inner_exhausted = true;
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_restartable(&self) -> bool {
        true
    }

    async fn restart(&mut self) -> Result<()> {
        self.replay_cursor = 0;
        Ok(())
    }
}
