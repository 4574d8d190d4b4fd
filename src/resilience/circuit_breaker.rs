//! Circuit breaker — per-node failure isolation
//!
//! Each node gets its own breaker, tracked by the
//! [`CircuitBreakerManager`]. A breaker starts `Closed` (calls pass
//! through). After `failure_threshold` consecutive failures it trips to
//! `Open` and every call is rejected with
//! [`crate::error::PipelineError::CircuitOpen`] without reaching the node at
//! all. After `open_duration` elapses it moves to `HalfOpen`, which admits
//! up to `half_open_trials` probe calls through (further concurrent callers
//! are rejected until one of those probes reports back); success closes the
//! breaker again, failure reopens it (and resets the open-since clock).
//!
//! A sliding window of recent outcomes is kept purely for observability
//! (exposed via [`CircuitBreaker::recent_failure_rate`]); breaker
//! transitions themselves are driven only by the consecutive-failure
//! counter, matching spec.md §4.8's explicit "consecutive, not windowed"
//! trip condition.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Breaker state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected without reaching the node.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// Configuration for a single node's breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to trip from `Closed` to `Open`.
    pub failure_threshold: u32,
    /// How long the breaker stays `Open` before allowing a probe.
    pub open_duration: Duration,
    /// Capacity of the observability-only sliding window.
    pub window_size: usize,
    /// Number of trial calls admitted while `HalfOpen` before further
    /// callers are rejected again.
    pub half_open_trials: u32,
    /// Whether outcomes are recorded into the observability sliding window
    /// at all. `false` skips the bookkeeping entirely for nodes that don't
    /// need [`CircuitBreaker::recent_failure_rate`].
    pub track_operations_in_window: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            window_size: 20,
            half_open_trials: 1,
            track_operations_in_window: true,
        }
    }
}

/// A single node's breaker state plus its sliding outcome window.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_trials_used: u32,
    window: VecDeque<bool>,
}

impl CircuitBreaker {
    /// Build a fresh, closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_trials_used: 0,
            window: VecDeque::with_capacity(config.window_size),
        }
    }

    /// Current state, after lazily transitioning `Open` -> `HalfOpen` if
    /// `open_duration` has elapsed.
    pub fn state(&mut self) -> CircuitBreakerState {
        if self.state == CircuitBreakerState::Open {
            if let Some(opened_at) = self.opened_at {
                if opened_at.elapsed() >= self.config.open_duration {
                    self.state = CircuitBreakerState::HalfOpen;
                    self.half_open_trials_used = 0;
                }
            }
        }
        self.state
    }

    /// Whether a call should be allowed through right now. Also performs
    /// the `Open` -> `HalfOpen` transition check as a side effect. While
    /// `HalfOpen`, only `half_open_trials` calls are admitted; callers past
    /// that count are rejected until the breaker closes or reopens.
    pub fn allow_call(&mut self) -> bool {
        match self.state() {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => false,
            CircuitBreakerState::HalfOpen => {
                if self.half_open_trials_used < self.config.half_open_trials {
                    self.half_open_trials_used += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call outcome.
    pub fn record_success(&mut self) {
        self.push_window(true);
        self.consecutive_failures = 0;
        self.state = CircuitBreakerState::Closed;
        self.opened_at = None;
        self.half_open_trials_used = 0;
    }

    /// Record a failed call outcome; trips the breaker if this pushes the
    /// consecutive-failure count to the threshold, or immediately reopens
    /// it if the failing call was a `HalfOpen` probe.
    pub fn record_failure(&mut self) {
        self.push_window(false);
        self.consecutive_failures += 1;
        if self.state == CircuitBreakerState::HalfOpen || self.consecutive_failures >= self.config.failure_threshold {
            self.state = CircuitBreakerState::Open;
            self.opened_at = Some(Instant::now());
            self.half_open_trials_used = 0;
        }
    }

    /// Failure rate over the observability sliding window, `0.0` if empty.
    pub fn recent_failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }

    fn push_window(&mut self, outcome: bool) {
        if !self.config.track_operations_in_window {
            return;
        }
        if self.window.len() == self.config.window_size {
            self.window.pop_front();
        }
        self.window.push_back(outcome);
    }
}

/// Owns one [`CircuitBreaker`] per node id, created lazily on first use.
/// Breakers are evicted after `idle_eviction` of inactivity to bound memory
/// on graphs with large or dynamically-named node populations.
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    idle_eviction: Duration,
    breakers: Mutex<HashMap<String, (CircuitBreaker, Instant)>>,
}

impl CircuitBreakerManager {
    /// Build a manager that lazily creates breakers with `config` and
    /// evicts ones unused for `idle_eviction`.
    pub fn new(config: CircuitBreakerConfig, idle_eviction: Duration) -> Self {
        Self {
            config,
            idle_eviction,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `node` should be allowed right now.
    pub async fn allow_call(&self, node: &str) -> bool {
        let mut breakers = self.breakers.lock().await;
        self.evict_idle(&mut breakers);
        let entry = breakers
            .entry(node.to_string())
            .or_insert_with(|| (CircuitBreaker::new(self.config), Instant::now()));
        entry.1 = Instant::now();
        entry.0.allow_call()
    }

    /// Record a call outcome for `node`.
    pub async fn record(&self, node: &str, success: bool) {
        let mut breakers = self.breakers.lock().await;
        let entry = breakers
            .entry(node.to_string())
            .or_insert_with(|| (CircuitBreaker::new(self.config), Instant::now()));
        entry.1 = Instant::now();
        if success {
            entry.0.record_success();
        } else {
            entry.0.record_failure();
        }
    }

    /// Number of breakers currently tracked, for diagnostics and tests.
    pub async fn tracked_count(&self) -> usize {
        self.breakers.lock().await.len()
    }

    fn evict_idle(&self, breakers: &mut HashMap<String, (CircuitBreaker, Instant)>) {
        let idle_eviction = self.idle_eviction;
        breakers.retain(|_, (_, last_used)| last_used.elapsed() < idle_eviction);
    }
}
