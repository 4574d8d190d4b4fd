//! Configuration surface — plain, serde-deserializable option structs
//!
//! The crate never reads a config file itself; a host application loads
//! JSON, YAML, or whatever it prefers and deserializes into
//! [`PipelineOptions`]. Defaults here match the conservative defaults
//! implied by spec.md §6: validation strict, resilience off, lineage off.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::validator::ValidationMode;
use crate::graph::NodeId;

/// Top-level options governing one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// How strictly the graph is validated before execution begins.
    pub graph_validation_mode: ValidationModeConfig,
    /// Error handling and resilience knobs.
    pub error_handling: ErrorHandlingOptions,
    /// Per-node overrides of `error_handling`, keyed by node id. A node
    /// without an entry here uses the pipeline-wide defaults unchanged.
    pub error_handling_overrides: HashMap<NodeId, ErrorHandlingOptions>,
    /// Lineage tracking knobs.
    pub lineage: LineageOptions,
    /// Scheduling and concurrency knobs.
    pub execution: ExecutionOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            graph_validation_mode: ValidationModeConfig::Error,
            error_handling: ErrorHandlingOptions::default(),
            error_handling_overrides: HashMap::new(),
            lineage: LineageOptions::default(),
            execution: ExecutionOptions::default(),
        }
    }
}

impl PipelineOptions {
    /// The effective error-handling options for `node`: its override if one
    /// is declared in `error_handling_overrides`, otherwise the pipeline-wide
    /// defaults in `error_handling`.
    pub fn error_handling_for(&self, node: &str) -> &ErrorHandlingOptions {
        self.error_handling_overrides.get(node).unwrap_or(&self.error_handling)
    }
}

/// Serde-friendly mirror of [`ValidationMode`] (which is not itself
/// `Deserialize`, since it is also constructed programmatically).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationModeConfig {
    /// Fail construction on any validation issue.
    Error,
    /// Log issues but proceed.
    Warn,
    /// Skip validation entirely.
    Off,
}

impl From<ValidationModeConfig> for ValidationMode {
    fn from(config: ValidationModeConfig) -> Self {
        match config {
            ValidationModeConfig::Error => ValidationMode::Error,
            ValidationModeConfig::Warn => ValidationMode::Warn,
            ValidationModeConfig::Off => ValidationMode::Off,
        }
    }
}

/// Retry, circuit breaker, and dead-letter knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingOptions {
    /// Maximum number of times a node is restarted before the pipeline
    /// error handler is asked for a final decision. `0` disables restarts.
    pub max_node_restart_attempts: u32,
    /// Maximum per-item retries inside a single node invocation.
    pub max_item_retry_attempts: u32,
    /// Initial delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Absolute ceiling on any computed retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Whether the circuit breaker is consulted before each node call.
    pub circuit_breaker_enabled: bool,
    /// Consecutive failures required to trip a node's breaker.
    pub circuit_breaker_failure_threshold: u32,
    /// How long a tripped breaker stays open, in milliseconds.
    pub circuit_breaker_open_duration_ms: u64,
    /// Number of trial calls admitted while the breaker is half-open.
    pub half_open_trials: u32,
    /// Whether the breaker records outcomes into its observability sliding
    /// window.
    pub track_operations_in_window: bool,
    /// Capacity of the in-memory dead-letter sink, if one is used.
    pub dead_letter_capacity: usize,
}

impl Default for ErrorHandlingOptions {
    fn default() -> Self {
        Self {
            max_node_restart_attempts: 0,
            max_item_retry_attempts: 0,
            initial_delay_ms: 500,
            max_delay_ms: 128_000,
            circuit_breaker_enabled: false,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_open_duration_ms: 30_000,
            half_open_trials: 1,
            track_operations_in_window: true,
            dead_letter_capacity: 10_000,
        }
    }
}

impl ErrorHandlingOptions {
    /// The initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// The absolute delay ceiling as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// The circuit breaker open duration as a [`Duration`].
    pub fn circuit_breaker_open_duration(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_open_duration_ms)
    }

    /// Project the breaker-relevant fields into a
    /// [`crate::resilience::CircuitBreakerConfig`], for hosts that just want
    /// to build one straight off the deserialized options.
    pub fn circuit_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            open_duration: self.circuit_breaker_open_duration(),
            window_size: 20,
            half_open_trials: self.half_open_trials,
            track_operations_in_window: self.track_operations_in_window,
        }
    }
}

/// Lineage tracking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageOptions {
    /// Whether lineage packets are constructed and checked at all.
    pub enabled: bool,
    /// Whether a cardinality mismatch fails the node (`true`) or only logs
    /// a warning (`false`).
    pub strict: bool,
}

impl Default for LineageOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            strict: true,
        }
    }
}

/// Scheduling, merge, and batching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Capacity of an interleave merge's internal channel, if bounded.
    /// `None` means unbounded.
    pub merge_interleave_capacity: Option<usize>,
    /// Default batch size for the batching strategy, when a node does not
    /// override it.
    pub default_batch_size: usize,
    /// Default batch time window, in milliseconds, when a node does not
    /// override it. `0` disables the time-based flush.
    pub default_batch_window_ms: u64,
    /// Cap on items buffered by a capped replayable pipe. `None` means
    /// unbounded.
    pub materialization_cap: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            merge_interleave_capacity: None,
            default_batch_size: 100,
            default_batch_window_ms: 0,
            materialization_cap: None,
        }
    }
}

impl ExecutionOptions {
    /// The batch time window as a [`Duration`], `None` if disabled.
    pub fn default_batch_window(&self) -> Option<Duration> {
        if self.default_batch_window_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.default_batch_window_ms))
        }
    }
}
