//! Retry delay strategies — exponential backoff and its relatives
//!
//! A [`DelayStrategy`] answers one question: given that attempt number
//! `attempt` (0-indexed) just failed, how long should the resilient
//! strategy wait before trying again? Three implementations are provided,
//! matching spec.md §4.7:
//!
//! - [`Fixed`] — the same delay every time.
//! - [`Exponential`] — `initial * factor^attempt`, capped, with optional
//!   jitter (the classic backoff shape).
//! - [`DecorrelatedJitter`] — AWS's "full jitter"-adjacent decorrelated
//!   jitter algorithm, which samples the next delay from
//!   `[base, previous * 3]` rather than deriving it purely from the attempt
//!   count; this spreads retries out more than fixed exponential jitter
//!   under correlated failure bursts.
//!
//! All strategies respect an absolute delay ceiling
//! ([`RetryOptions::max_delay`]) applied after the strategy computes its own
//! value, so a misconfigured exponential strategy can never stall a run for
//! an unreasonable span.

use std::time::Duration;

use rand::Rng;

/// How long to wait before the next attempt, given the attempt index that
/// just failed and (for decorrelated jitter) the previous delay returned.
pub trait DelayStrategy: Send + Sync {
    /// Compute the next delay. `attempt` is 0-indexed (0 = the first retry,
    /// after the initial attempt failed). `previous` is the delay this
    /// strategy returned last time, if any — only [`DecorrelatedJitter`]
    /// uses it.
    fn next_delay(&self, attempt: u32, previous: Option<Duration>) -> Duration;
}

/// The same delay every attempt.
#[derive(Debug, Clone, Copy)]
pub struct Fixed {
    /// Delay applied to every attempt.
    pub delay: Duration,
}

impl Fixed {
    /// Build a fixed-delay strategy.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayStrategy for Fixed {
    fn next_delay(&self, _attempt: u32, _previous: Option<Duration>) -> Duration {
        self.delay
    }
}

/// Exponential backoff: `initial * factor^attempt`, capped at `max`, with
/// optional multiplicative jitter in `[0.5, 1.5)`.
#[derive(Debug, Clone, Copy)]
pub struct Exponential {
    /// Delay for attempt 0.
    pub initial: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Upper bound before jitter is applied.
    pub max: Duration,
    /// Whether to randomize the computed delay.
    pub jitter: bool,
}

impl Exponential {
    /// Build with jitter enabled, matching the teacher's default shape.
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            jitter: true,
        }
    }

    /// Disable jitter, for deterministic tests.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl DelayStrategy for Exponential {
    fn next_delay(&self, attempt: u32, _previous: Option<Duration>) -> Duration {
        let base = self.initial.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = base.min(self.max.as_secs_f64());
        let final_secs = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..1.5);
            capped * jitter_factor
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs.max(0.0))
    }
}

/// Decorrelated jitter: `next = random(base, previous * 3)`, capped at
/// `max`. Falls back to `base` for the first attempt, when there is no
/// previous delay to correlate against.
#[derive(Debug, Clone, Copy)]
pub struct DecorrelatedJitter {
    /// Floor for every sampled delay, and the value used for attempt 0.
    pub base: Duration,
    /// Upper bound on any sampled delay.
    pub max: Duration,
}

impl DecorrelatedJitter {
    /// Build a decorrelated-jitter strategy.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl DelayStrategy for DecorrelatedJitter {
    fn next_delay(&self, _attempt: u32, previous: Option<Duration>) -> Duration {
        let base_secs = self.base.as_secs_f64();
        let max_secs = self.max.as_secs_f64();
        let upper = match previous {
            Some(prev) => (prev.as_secs_f64() * 3.0).max(base_secs),
            None => base_secs,
        }
        .min(max_secs);
        let sampled = if upper > base_secs {
            rand::thread_rng().gen_range(base_secs..=upper)
        } else {
            base_secs
        };
        Duration::from_secs_f64(sampled)
    }
}

/// Retry configuration consulted by the resilient strategy: how many times
/// to restart a failed node, how many per-item retries a node-level
/// `Retry` decision gets, how that delay is computed, and the absolute
/// ceiling applied to every computed delay regardless of strategy.
pub struct RetryOptions {
    /// Maximum number of times the resilient strategy restarts a whole node
    /// after it fails (spec.md's `retry.max-node-restart-attempts`).
    pub max_node_restart_attempts: u32,
    /// Maximum number of times a single item is retried in place when a
    /// node's error handler returns `NodeErrorDecision::Retry`.
    pub max_item_retry_attempts: u32,
    /// Delay strategy consulted between attempts.
    pub delay_strategy: Box<dyn DelayStrategy>,
    /// Hard ceiling applied after the strategy computes its delay.
    pub max_delay: Duration,
}

impl RetryOptions {
    /// Compute the delay for `attempt`, clamped to [`RetryOptions::max_delay`].
    pub fn delay_for(&self, attempt: u32, previous: Option<Duration>) -> Duration {
        self.delay_strategy.next_delay(attempt, previous).min(self.max_delay)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_node_restart_attempts: 0,
            max_item_retry_attempts: 0,
            delay_strategy: Box::new(Exponential::new(
                Duration::from_millis(500),
                2.0,
                Duration::from_secs(128),
            )),
            max_delay: Duration::from_secs(128),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_never_changes() {
        let s = Fixed::new(Duration::from_millis(100));
        assert_eq!(s.next_delay(0, None), Duration::from_millis(100));
        assert_eq!(s.next_delay(5, None), Duration::from_millis(100));
    }

    #[test]
    fn exponential_without_jitter_doubles_and_caps() {
        let s = Exponential::new(Duration::from_millis(100), 2.0, Duration::from_millis(350))
            .without_jitter();
        assert_eq!(s.next_delay(0, None), Duration::from_millis(100));
        assert_eq!(s.next_delay(1, None), Duration::from_millis(200));
        assert_eq!(s.next_delay(2, None), Duration::from_millis(350));
        assert_eq!(s.next_delay(10, None), Duration::from_millis(350));
    }

    #[test]
    fn decorrelated_jitter_stays_within_bounds() {
        let s = DecorrelatedJitter::new(Duration::from_millis(50), Duration::from_secs(2));
        let mut prev = None;
        for _ in 0..50 {
            let d = s.next_delay(0, prev);
            assert!(d >= Duration::from_millis(50));
            assert!(d <= Duration::from_secs(2));
            prev = Some(d);
        }
    }

    #[test]
    fn retry_options_clamps_to_absolute_ceiling() {
        let opts = RetryOptions {
            max_node_restart_attempts: 3,
            max_item_retry_attempts: 0,
            delay_strategy: Box::new(Fixed::new(Duration::from_secs(10))),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(opts.delay_for(0, None), Duration::from_secs(1));
    }
}
