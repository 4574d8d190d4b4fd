//! Rule-driven static validation of a [`Graph`](super::Graph)
//!
//! The validator runs a fixed rule set over a frozen graph and reports
//! every issue it finds, rather than failing on the first one — except for
//! rules that declare themselves "stop on error" (currently only the cycle
//! rule, since every downstream rule assumes acyclicity).
//!
//! # Modes
//!
//! - [`ValidationMode::Error`] — any issue fails graph construction.
//! - [`ValidationMode::Warn`] — issues are returned but construction succeeds.
//! - [`ValidationMode::Off`] — the validator is not run at all.
//!
//! # Example
//!
//! ```rust
//! use flowcore::graph::{Graph, NodeDescriptor, NodeKind, Edge};
//! use flowcore::graph::validator::{GraphValidator, ValidationMode};
//!
//! let mut g = Graph::new();
//! g.add_node(NodeDescriptor::new("a", "A", NodeKind::Transform)); // no source, no sink
//!
//! let validator = GraphValidator::new(ValidationMode::Warn);
//! let report = validator.validate(&g);
//! assert!(!report.issues.is_empty());
//! ```

use std::collections::{HashMap, HashSet};

use super::{Graph, NodeId, NodeKind};

/// How strictly the validator enforces its rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Any issue fails graph construction.
    #[default]
    Error,
    /// Issues are logged/returned but construction proceeds.
    Warn,
    /// The validator does not run.
    Off,
}

/// Severity the rule that produced an issue assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fails the build under [`ValidationMode::Error`].
    Error,
    /// Never fails the build, purely informational.
    Warning,
}

/// One concrete problem found in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Which rule produced this issue, e.g. `"connectivity"`, `"cycle"`.
    pub rule: &'static str,
    /// Node id this issue is about, if any.
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
    /// Severity assigned by the rule.
    pub severity: Severity,
}

/// Aggregate result of running the validator over a graph.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Every issue found, across all rules that ran.
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// True if any issue has [`Severity::Error`].
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }
}

/// A single validation rule. Rules are pure functions over the graph; they
/// never mutate it and never talk to each other.
trait Rule {
    fn name(&self) -> &'static str;
    /// Run the rule, appending issues to `issues`. Returns `true` if later
    /// rules should be skipped (e.g. the cycle rule, since a cyclic graph
    /// makes topological-order-dependent rules meaningless).
    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool;
}

struct ConnectivityRule;
impl Rule for ConnectivityRule {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        for node in graph.nodes() {
            let is_dead_letter = graph.metadata.dead_letter_nodes.contains(&node.id);
            let has_incoming = graph.incoming(&node.id).next().is_some();
            let has_outgoing = graph.outgoing(&node.id).next().is_some();

            if node.kind != NodeKind::Source && !has_incoming && !is_dead_letter {
                issues.push(Issue {
                    rule: self.name(),
                    node: Some(node.id.clone()),
                    message: format!("non-source node '{}' has no incoming edge", node.id),
                    severity: Severity::Error,
                });
            }
            if node.kind != NodeKind::Sink && !has_outgoing && !is_dead_letter {
                issues.push(Issue {
                    rule: self.name(),
                    node: Some(node.id.clone()),
                    message: format!("non-sink node '{}' has no outgoing edge", node.id),
                    severity: Severity::Error,
                });
            }
        }

        for component in graph.weak_components() {
            let sink_count = graph
                .nodes()
                .iter()
                .filter(|n| component.contains(&n.id) && n.kind == NodeKind::Sink)
                .count();
            if sink_count != 1 {
                issues.push(Issue {
                    rule: self.name(),
                    node: None,
                    message: format!(
                        "connected component with {} node(s) has {} sink(s), expected exactly 1",
                        component.len(),
                        sink_count
                    ),
                    severity: Severity::Error,
                });
            }
        }
        false
    }
}

struct CycleRule;
impl Rule for CycleRule {
    fn name(&self) -> &'static str {
        "cycle"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> = graph
            .nodes()
            .iter()
            .map(|n| (n.id.as_str(), Color::White))
            .collect();

        fn visit<'a>(
            id: &'a str,
            graph: &'a Graph,
            color: &mut HashMap<&'a str, Color>,
            issues: &mut Vec<Issue>,
            rule: &'static str,
        ) {
            color.insert(id, Color::Gray);
            for edge in graph.outgoing(id) {
                match color.get(edge.to.as_str()).copied().unwrap_or(Color::White) {
                    Color::White => visit(edge.to.as_str(), graph, color, issues, rule),
                    Color::Gray => {
                        issues.push(Issue {
                            rule,
                            node: Some(edge.from.clone()),
                            message: format!(
                                "cycle detected: back-edge {} -> {}",
                                edge.from, edge.to
                            ),
                            severity: Severity::Error,
                        });
                    }
                    Color::Black => {}
                }
            }
            color.insert(id, Color::Black);
        }

        for node in graph.nodes() {
            if color[node.id.as_str()] == Color::White {
                visit(&node.id, graph, &mut color, issues, self.name());
            }
        }

        issues.iter().any(|i| i.rule == self.name())
    }
}

struct TypeRule;
impl Rule for TypeRule {
    fn name(&self) -> &'static str {
        "type"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        for edge in graph.edges() {
            let (Some(from), Some(to)) = (graph.node(&edge.from), graph.node(&edge.to)) else {
                continue;
            };
            if let (Some(out_ty), Some(in_ty)) = (&from.output_type, &to.input_type) {
                if out_ty != in_ty {
                    issues.push(Issue {
                        rule: self.name(),
                        node: Some(edge.to.clone()),
                        message: format!(
                            "edge {} -> {}: output type '{}' is not assignable to input type '{}'",
                            edge.from, edge.to, out_ty, in_ty
                        ),
                        severity: Severity::Error,
                    });
                }
            }
        }
        false
    }
}

struct CardinalityRule;
impl Rule for CardinalityRule {
    fn name(&self) -> &'static str {
        "cardinality"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        for node in graph.nodes() {
            if node.kind == NodeKind::Transform && node.cardinality.is_none() {
                issues.push(Issue {
                    rule: self.name(),
                    node: Some(node.id.clone()),
                    message: format!("transform '{}' declares no cardinality", node.id),
                    severity: Severity::Error,
                });
            }
        }
        false
    }
}

struct PortRule;
impl Rule for PortRule {
    fn name(&self) -> &'static str {
        "port"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        for edge in graph.edges() {
            if let Some(output_port) = &edge.output_port {
                match graph.node(&edge.from) {
                    Some(from) if from.output_ports.iter().any(|p| p == output_port) => {}
                    Some(_) => issues.push(Issue {
                        rule: self.name(),
                        node: Some(edge.from.clone()),
                        message: format!(
                            "edge {} -> {}: output port '{}' is not declared on node '{}'",
                            edge.from, edge.to, output_port, edge.from
                        ),
                        severity: Severity::Error,
                    }),
                    None => issues.push(Issue {
                        rule: self.name(),
                        node: Some(edge.from.clone()),
                        message: format!("edge references unknown output port source '{}'", edge.from),
                        severity: Severity::Error,
                    }),
                }
            }
            if let Some(input_port) = &edge.input_port {
                match graph.node(&edge.to) {
                    Some(to) if to.input_ports.iter().any(|p| p == input_port) => {}
                    Some(_) => issues.push(Issue {
                        rule: self.name(),
                        node: Some(edge.to.clone()),
                        message: format!(
                            "edge {} -> {}: input port '{}' is not declared on node '{}'",
                            edge.from, edge.to, input_port, edge.to
                        ),
                        severity: Severity::Error,
                    }),
                    None => issues.push(Issue {
                        rule: self.name(),
                        node: Some(edge.to.clone()),
                        message: format!("edge references unknown input port target '{}'", edge.to),
                        severity: Severity::Error,
                    }),
                }
            }
        }
        false
    }
}

struct UniqueNameRule;
impl Rule for UniqueNameRule {
    fn name(&self) -> &'static str {
        "unique-name"
    }

    fn check(&self, graph: &Graph, issues: &mut Vec<Issue>) -> bool {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut duplicated: HashSet<&str> = HashSet::new();
        for node in graph.nodes() {
            if let Some(existing) = seen.insert(node.display_name.as_str(), node.id.as_str()) {
                if existing != node.id.as_str() {
                    duplicated.insert(node.display_name.as_str());
                }
            }
        }
        for name in duplicated {
            issues.push(Issue {
                rule: self.name(),
                node: None,
                message: format!("display name '{name}' is used by more than one node"),
                severity: Severity::Error,
            });
        }
        false
    }
}

/// Runs the fixed rule set over a graph according to a [`ValidationMode`].
pub struct GraphValidator {
    mode: ValidationMode,
}

impl GraphValidator {
    /// Build a validator for the given mode.
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// Run every rule and collect issues. Returns an empty report
    /// immediately under [`ValidationMode::Off`].
    pub fn validate(&self, graph: &Graph) -> ValidationReport {
        let mut issues = Vec::new();
        if self.mode == ValidationMode::Off {
            return ValidationReport { issues };
        }

        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(CycleRule),
            Box::new(ConnectivityRule),
            Box::new(TypeRule),
            Box::new(CardinalityRule),
            Box::new(PortRule),
            Box::new(UniqueNameRule),
        ];

        for rule in rules {
            let stop = rule.check(graph, &mut issues);
            if stop {
                break;
            }
        }

        ValidationReport { issues }
    }

    /// Validate and turn the report into a [`crate::error::PipelineError`]
    /// when the mode is `Error` and issues were found.
    pub fn validate_or_err(&self, graph: &Graph) -> crate::error::Result<ValidationReport> {
        let report = self.validate(graph);
        if self.mode == ValidationMode::Error && report.has_errors() {
            let summary = report
                .issues
                .iter()
                .map(|i| i.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(crate::error::PipelineError::GraphValidation(summary));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, NodeDescriptor, NodeKind};

    #[test]
    fn error_mode_fails_on_disconnected_transform() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Transform));
        let validator = GraphValidator::new(ValidationMode::Error);
        assert!(validator.validate_or_err(&g).is_err());
    }

    #[test]
    fn warn_mode_succeeds_but_reports() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Transform));
        let validator = GraphValidator::new(ValidationMode::Warn);
        let report = validator.validate(&g);
        assert!(!report.issues.is_empty());
    }

    #[test]
    fn off_mode_runs_nothing() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Transform));
        let validator = GraphValidator::new(ValidationMode::Off);
        assert!(validator.validate(&g).issues.is_empty());
    }

    #[test]
    fn detects_cycles() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Source));
        g.add_node(NodeDescriptor::new("b", "B", NodeKind::Sink));
        g.add_edge(Edge::new("a", "b"));
        g.add_edge(Edge::new("b", "a"));
        let validator = GraphValidator::new(ValidationMode::Warn);
        let report = validator.validate(&g);
        assert!(report.issues.iter().any(|i| i.rule == "cycle"));
    }

    #[test]
    fn detects_duplicate_display_names() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "Same", NodeKind::Source));
        g.add_node(NodeDescriptor::new("b", "Same", NodeKind::Sink));
        g.add_edge(Edge::new("a", "b"));
        let validator = GraphValidator::new(ValidationMode::Warn);
        let report = validator.validate(&g);
        assert!(report.issues.iter().any(|i| i.rule == "unique-name"));
    }

    #[test]
    fn detects_edges_naming_undeclared_ports() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Source));
        g.add_node(
            NodeDescriptor::new("b", "B", NodeKind::Sink).with_ports(Vec::<String>::new(), ["left"]),
        );
        g.add_edge(Edge::with_ports("a", "b", "out", "right"));
        let validator = GraphValidator::new(ValidationMode::Warn);
        let report = validator.validate(&g);
        assert!(report.issues.iter().any(|i| i.rule == "port"));
    }

    #[test]
    fn accepts_edges_naming_declared_ports() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Source).with_ports(["out"], Vec::<String>::new()));
        g.add_node(NodeDescriptor::new("b", "B", NodeKind::Sink).with_ports(Vec::<String>::new(), ["in"]));
        g.add_edge(Edge::with_ports("a", "b", "out", "in"));
        let validator = GraphValidator::new(ValidationMode::Error);
        assert!(validator.validate_or_err(&g).is_ok());
    }

    #[test]
    fn valid_chain_has_no_errors() {
        let mut g = Graph::new();
        g.add_node(NodeDescriptor::new("a", "A", NodeKind::Source));
        g.add_node(
            NodeDescriptor::new("b", "B", NodeKind::Transform)
                .with_cardinality(crate::graph::Cardinality::OneToOne),
        );
        g.add_node(NodeDescriptor::new("c", "C", NodeKind::Sink));
        g.add_edge(Edge::new("a", "b"));
        g.add_edge(Edge::new("b", "c"));
        let validator = GraphValidator::new(ValidationMode::Error);
        assert!(validator.validate_or_err(&g).is_ok());
    }
}
