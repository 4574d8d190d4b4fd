//! Lineage adapter — per-item provenance and cardinality enforcement
//!
//! Every item flowing through a node that has lineage enabled is wrapped in
//! a [`LineagePacket`] carrying its payload plus a record id, the parent
//! record ids it was derived from, and the traversal path of node ids it
//! has passed through. The adapter enforces that the number of output
//! packets a node emits per input packet matches the node's declared
//! [`crate::graph::Cardinality`]; a mismatch is either a hard error
//! ([`Mode::Strict`]) or a logged warning ([`Mode::Warn`]).

pub mod sink;

use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::graph::Cardinality;

/// A single unit of payload plus its provenance.
#[derive(Debug, Clone)]
pub struct LineagePacket<T> {
    /// The actual data flowing through the graph.
    pub payload: T,
    /// Unique id assigned to this packet.
    pub record_id: String,
    /// Ids of the packet(s) this one was derived from, empty at a source.
    pub parent_ids: Vec<String>,
    /// Node ids this packet has passed through, in order, source first.
    pub traversal_path: Vec<String>,
}

impl<T> LineagePacket<T> {
    /// Build a root packet with no parents, originating at `node`.
    pub fn root(payload: T, record_id: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            payload,
            record_id: record_id.into(),
            parent_ids: Vec::new(),
            traversal_path: vec![node.into()],
        }
    }

    /// Derive a child packet: carries `self`'s id as its sole parent and
    /// appends `node` to the traversal path.
    pub fn derive(&self, payload: T, record_id: impl Into<String>, node: impl Into<String>) -> Self {
        let mut traversal_path = self.traversal_path.clone();
        traversal_path.push(node.into());
        Self {
            payload,
            record_id: record_id.into(),
            parent_ids: vec![self.record_id.clone()],
            traversal_path,
        }
    }
}

/// How strictly cardinality mismatches are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Raise [`PipelineError::LineageCardinalityMismatch`] on mismatch.
    Strict,
    /// Log the mismatch (via `tracing::warn!`) and continue.
    Warn,
}

/// What was actually observed for one cardinality check, shaped to match
/// what each [`Cardinality`] variant can meaningfully verify.
#[derive(Debug, Clone)]
pub enum Observed<'a> {
    /// Packet count produced from one input, checked against `OneToOne`
    /// (must be exactly 1) and `OneToMany` (must be at least 1).
    Outputs(usize),
    /// Parent record ids attached to one aggregated output packet, checked
    /// against `ManyToOne`: every id must be distinct, and their count must
    /// match `folded`, the number of inputs actually collapsed into this
    /// output.
    Parents { ids: &'a [String], folded: usize },
}

/// Checks a node's observed input/output packet counts against its
/// declared cardinality.
pub struct CardinalityEnforcer {
    node: String,
    cardinality: Cardinality,
    mode: Mode,
}

impl CardinalityEnforcer {
    /// Build an enforcer for `node`, declared as `cardinality`, checked
    /// under `mode`.
    pub fn new(node: impl Into<String>, cardinality: Cardinality, mode: Mode) -> Self {
        Self {
            node: node.into(),
            cardinality,
            mode,
        }
    }

    /// Check one observation against the declared cardinality.
    /// `Cardinality::Custom` always passes — its contract is defined by the
    /// node implementation, not enforced generically here. An `observed`
    /// shape that doesn't match the declared cardinality (e.g. an
    /// `Outputs` count checked against `ManyToOne`) is itself a mismatch,
    /// since it means the caller and the declared cardinality disagree on
    /// what this node even produces.
    pub fn check(&self, observed: Observed<'_>) -> Result<()> {
        let (ok, observed_desc) = match (self.cardinality, &observed) {
            (Cardinality::Custom, _) => (true, String::new()),
            (Cardinality::OneToOne, Observed::Outputs(n)) => (*n == 1, n.to_string()),
            (Cardinality::OneToMany, Observed::Outputs(n)) => (*n >= 1, n.to_string()),
            (Cardinality::ManyToOne, Observed::Parents { ids, folded }) => {
                let unique: HashSet<&String> = ids.iter().collect();
                let ok = unique.len() == ids.len() && ids.len() == *folded;
                (ok, format!("{} parent id(s)", ids.len()))
            }
            (_, Observed::Outputs(n)) => (false, n.to_string()),
            (_, Observed::Parents { ids, .. }) => (false, format!("{} parent id(s)", ids.len())),
        };
        if ok {
            return Ok(());
        }
        let expected = self.cardinality.to_string();
        match self.mode {
            Mode::Strict => Err(PipelineError::LineageCardinalityMismatch {
                node: self.node.clone(),
                expected,
                observed: observed_desc,
            }),
            Mode::Warn => {
                tracing::warn!(
                    node = %self.node,
                    expected = %expected,
                    observed = %observed_desc,
                    "lineage cardinality mismatch"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_appends_traversal_and_sets_parent() {
        let root = LineagePacket::root(1, "r1", "source");
        let child = root.derive(2, "r2", "transform");
        assert_eq!(child.parent_ids, vec!["r1".to_string()]);
        assert_eq!(child.traversal_path, vec!["source".to_string(), "transform".to_string()]);
    }

    #[test]
    fn strict_mode_rejects_one_to_one_violation() {
        let enforcer = CardinalityEnforcer::new("t1", Cardinality::OneToOne, Mode::Strict);
        assert!(enforcer.check(Observed::Outputs(1)).is_ok());
        assert!(enforcer.check(Observed::Outputs(2)).is_err());
        assert!(enforcer.check(Observed::Outputs(0)).is_err());
    }

    #[test]
    fn warn_mode_never_errors() {
        let enforcer = CardinalityEnforcer::new("t1", Cardinality::OneToOne, Mode::Warn);
        assert!(enforcer.check(Observed::Outputs(5)).is_ok());
    }

    #[test]
    fn one_to_many_requires_at_least_one() {
        let enforcer = CardinalityEnforcer::new("t1", Cardinality::OneToMany, Mode::Strict);
        assert!(enforcer.check(Observed::Outputs(0)).is_err());
        assert!(enforcer.check(Observed::Outputs(3)).is_ok());
    }

    #[test]
    fn custom_cardinality_always_passes() {
        let enforcer = CardinalityEnforcer::new("t1", Cardinality::Custom, Mode::Strict);
        assert!(enforcer.check(Observed::Outputs(0)).is_ok());
        assert!(enforcer.check(Observed::Outputs(100)).is_ok());
    }

    #[test]
    fn many_to_one_accepts_a_distinct_parent_set_matching_the_fold_count() {
        let enforcer = CardinalityEnforcer::new("agg", Cardinality::ManyToOne, Mode::Strict);
        let ids = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        assert!(enforcer
            .check(Observed::Parents { ids: &ids, folded: 3 })
            .is_ok());
    }

    #[test]
    fn many_to_one_rejects_duplicate_parent_ids() {
        let enforcer = CardinalityEnforcer::new("agg", Cardinality::ManyToOne, Mode::Strict);
        let ids = vec!["p1".to_string(), "p1".to_string(), "p3".to_string()];
        let err = enforcer.check(Observed::Parents { ids: &ids, folded: 3 }).unwrap_err();
        assert!(matches!(err, PipelineError::LineageCardinalityMismatch { .. }));
    }

    #[test]
    fn many_to_one_rejects_a_parent_count_mismatch() {
        let enforcer = CardinalityEnforcer::new("agg", Cardinality::ManyToOne, Mode::Strict);
        let ids = vec!["p1".to_string(), "p2".to_string()];
        assert!(enforcer
            .check(Observed::Parents { ids: &ids, folded: 3 })
            .is_err());
    }
}
