//! Graph descriptor — immutable node/edge model with typed ports
//!
//! A [`Graph`] is built once, validated once, and never mutated after that.
//! The scheduler only ever needs three things from it: O(1) id lookup,
//! in-order topological enumeration, and precomputed adjacency — all
//! provided here so strategies never walk the node/edge vectors themselves.
//!
//! # Example
//!
//! ```rust
//! use flowcore::graph::{Graph, NodeDescriptor, NodeKind, Edge, Cardinality};
//!
//! let mut graph = Graph::new();
//! graph.add_node(NodeDescriptor::new("src", "Source", NodeKind::Source));
//! graph.add_node(NodeDescriptor::new("double", "Doubler", NodeKind::Transform)
//!     .with_cardinality(Cardinality::OneToOne));
//! graph.add_node(NodeDescriptor::new("sink", "Sink", NodeKind::Sink));
//!
//! graph.add_edge(Edge::new("src", "double"));
//! graph.add_edge(Edge::new("double", "sink"));
//!
//! let order = graph.toposort().unwrap();
//! assert_eq!(order, vec!["src".to_string(), "double".to_string(), "sink".to_string()]);
//! ```

pub mod validator;

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Node identifier — unique within a graph.
pub type NodeId = String;

/// What role a node plays in the graph. Drives the connectivity rules in
/// [`validator`]: sources have no inputs, sinks have no outputs, everything
/// else needs both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Produces items; has no incoming edges.
    Source,
    /// Maps items; has exactly one logical input and output stream.
    Transform,
    /// Consumes items; has no outgoing edges.
    Sink,
    /// Consumes multiple named input streams keyed by a selector.
    Join,
    /// Consumes a full collection or window, emits zero or more outputs.
    Aggregate,
}

/// Declared cardinality of a transform, enforced by the lineage adapter when
/// lineage is enabled (see [`crate::lineage`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One input item produces exactly one output item.
    OneToOne,
    /// One input item produces N output items (N decided at runtime).
    OneToMany,
    /// N input items collapse into one output item.
    ManyToOne,
    /// Parent/child relationships are decided by a registered custom mapper.
    Custom,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

/// How a node with multiple incoming edges combines them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeConfig {
    /// Drain each upstream pipe to completion, strictly in declared edge order.
    Concatenate,
    /// Multiplex all upstream pipes through a mailbox of the given capacity
    /// (`None` = unbounded).
    Interleave {
        /// Mailbox capacity; `None` means unbounded (caller accepts memory growth).
        capacity: Option<usize>,
    },
    /// A registered custom merge function name, resolved by the runner.
    Custom(String),
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig::Concatenate
    }
}

/// Immutable per-node descriptor.
///
/// Descriptors never hold a reference to a live node instance — that
/// binding happens at execute time via a type-token registry, keeping the
/// descriptor `Clone` and safely shareable across a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique identifier, used for all internal lookups.
    pub id: NodeId,
    /// Human-friendly name; must also be unique (spec invariant).
    pub display_name: String,
    /// Role this node plays in the graph.
    pub kind: NodeKind,
    /// Input type token, e.g. a type name. `None` for pure sources.
    pub input_type: Option<String>,
    /// Output type token. `None` for pure sinks.
    pub output_type: Option<String>,
    /// Declared cardinality; only meaningful for `Transform` nodes.
    pub cardinality: Option<Cardinality>,
    /// How incoming edges are merged, for nodes with more than one.
    pub merge: MergeConfig,
    /// Name of a registered error handler type, if any.
    pub error_handler: Option<String>,
    /// Name of a registered lineage adapter/mapper, if any.
    pub lineage_adapter: Option<String>,
    /// Named output ports this node exposes, beyond the implicit single
    /// stream. Empty means the node has no named output ports at all, so
    /// any edge naming one is invalid.
    pub output_ports: Vec<String>,
    /// Named input ports this node exposes. Empty means no named input
    /// ports; every edge into this node must then leave `input_port` unset.
    pub input_ports: Vec<String>,
}

impl NodeDescriptor {
    /// Construct a descriptor with no type tokens, default merge and no
    /// handlers — callers refine with the `with_*` builders.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            input_type: None,
            output_type: None,
            cardinality: None,
            merge: MergeConfig::default(),
            error_handler: None,
            lineage_adapter: None,
            output_ports: Vec::new(),
            input_ports: Vec::new(),
        }
    }

    /// Attach declared input/output type tokens.
    pub fn with_types(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_type = Some(input.into());
        self.output_type = Some(output.into());
        self
    }

    /// Attach a declared cardinality (transforms only).
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    /// Attach a merge configuration for multi-input nodes.
    pub fn with_merge(mut self, merge: MergeConfig) -> Self {
        self.merge = merge;
        self
    }

    /// Attach a named error handler.
    pub fn with_error_handler(mut self, handler: impl Into<String>) -> Self {
        self.error_handler = Some(handler.into());
        self
    }

    /// Declare the named output/input ports this node exposes. Edges that
    /// name a port the referenced node didn't declare here fail
    /// [`validator::rules`]'s port rule at validation time.
    pub fn with_ports<O, I>(mut self, output_ports: O, input_ports: I) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.output_ports = output_ports.into_iter().map(Into::into).collect();
        self.input_ports = input_ports.into_iter().map(Into::into).collect();
        self
    }
}

/// Directed connection between two nodes, optionally through named ports.
///
/// Ports only matter for nodes with more than one logical input or output
/// (joins, fan-out transforms); single-port nodes can leave them `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Upstream node id.
    pub from: NodeId,
    /// Downstream node id.
    pub to: NodeId,
    /// Named output port on `from`, if it has more than one.
    pub output_port: Option<String>,
    /// Named input port on `to`, if it has more than one.
    pub input_port: Option<String>,
}

impl Edge {
    /// A plain edge with no named ports.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            output_port: None,
            input_port: None,
        }
    }

    /// An edge through named ports on both ends.
    pub fn with_ports(
        from: impl Into<String>,
        to: impl Into<String>,
        output_port: impl Into<String>,
        input_port: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            output_port: Some(output_port.into()),
            input_port: Some(input_port.into()),
        }
    }
}

/// Dead-letter sink node ids are exempt from the "every non-sink node has an
/// outgoing edge" / "every non-source node has an incoming edge" invariants
/// — they terminate failures, not the happy path.
#[derive(Debug, Clone, Default)]
pub struct GraphMetadata {
    /// Node ids that act purely as dead-letter destinations.
    pub dead_letter_nodes: HashSet<NodeId>,
}

/// The immutable graph: nodes, edges, a frozen id index, and the adjacency
/// computed once at build time.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeDescriptor>,
    edges: Vec<Edge>,
    index: HashMap<NodeId, usize>,
    outgoing: HashMap<NodeId, Vec<usize>>,
    incoming: HashMap<NodeId, Vec<usize>>,
    /// Sub-configuration carried alongside the structural graph.
    pub metadata: GraphMetadata,
}

impl Graph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Panics on duplicate id — descriptors are meant to be
    /// assembled once, by a single builder, before any validation runs.
    pub fn add_node(&mut self, node: NodeDescriptor) -> &mut Self {
        assert!(
            !self.index.contains_key(&node.id),
            "duplicate node id '{}'",
            node.id
        );
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        self
    }

    /// Add an edge and update the precomputed adjacency.
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        let idx = self.edges.len();
        self.outgoing.entry(edge.from.clone()).or_default().push(idx);
        self.incoming.entry(edge.to.clone()).or_default().push(idx);
        self.edges.push(edge);
        self
    }

    /// O(1) id -> descriptor lookup.
    pub fn node(&self, id: &str) -> Option<&NodeDescriptor> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// All node descriptors, in insertion order.
    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges whose `to` is `id`.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Edges whose `from` is `id`.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Topologically order node ids via Kahn's algorithm.
    ///
    /// Returns `None` if the graph contains a cycle — callers that need a
    /// diagnosis of *where* the cycle is should use
    /// [`validator::rules::CycleRule`] instead, which reports the back-edge.
    pub fn toposort(&self) -> Option<Vec<NodeId>> {
        let mut indegree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), 0usize))
            .collect();
        for edge in &self.edges {
            if let Some(d) = indegree.get_mut(edge.to.as_str()) {
                *d += 1;
            }
        }

        // Deterministic order: process ready nodes in descriptor order.
        let order_index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort_by_key(|id| order_index[id]);
        let mut queue: VecDeque<&str> = ready.into();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            result.push(id.to_string());
            let mut newly_ready = Vec::new();
            for edge in self.outgoing(id) {
                if let Some(d) = indegree.get_mut(edge.to.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        newly_ready.push(edge.to.as_str());
                    }
                }
            }
            newly_ready.sort_by_key(|id| order_index[id]);
            for id in newly_ready {
                queue.push_back(id);
            }
        }

        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }

    /// Weakly-connected components, as sets of node ids. Used by the
    /// connectivity rule to check "exactly one sink per component".
    pub fn weak_components(&self) -> Vec<HashSet<NodeId>> {
        let mut undirected: HashMap<&str, HashSet<&str>> = HashMap::new();
        for node in &self.nodes {
            undirected.entry(node.id.as_str()).or_default();
        }
        for edge in &self.edges {
            undirected
                .entry(edge.from.as_str())
                .or_default()
                .insert(edge.to.as_str());
            undirected
                .entry(edge.to.as_str())
                .or_default()
                .insert(edge.from.as_str());
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();
        for node in &self.nodes {
            if visited.contains(node.id.as_str()) {
                continue;
            }
            let mut component = HashSet::new();
            let mut stack = vec![node.id.as_str()];
            while let Some(cur) = stack.pop() {
                if !visited.insert(cur) {
                    continue;
                }
                component.insert(cur.to_string());
                if let Some(neighbors) = undirected.get(cur) {
                    for &n in neighbors {
                        if !visited.contains(n) {
                            stack.push(n);
                        }
                    }
                }
            }
            components.push(component);
        }
        components
    }
}
