//! Transaction-flow graph model.
//!
//! A directed graph of aggregated value transfers between addresses. At most
//! one edge exists per ordered (source, target) pair; repeated transfers
//! between the same pair fold into that edge's weight, volume, token set and
//! time range. Nodes are created lazily and never removed during a run, and
//! the graph is read-only to every analyzer component once built.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Classification of a graph node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Address,
    Entity,
    Contract,
    Mixer,
    Bridge,
    Exchange,
    ExchangeWithdrawal,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Address => write!(f, "address"),
            NodeType::Entity => write!(f, "entity"),
            NodeType::Contract => write!(f, "contract"),
            NodeType::Mixer => write!(f, "mixer"),
            NodeType::Bridge => write!(f, "bridge"),
            NodeType::Exchange => write!(f, "exchange"),
            NodeType::ExchangeWithdrawal => write!(f, "exchange_withdrawal"),
        }
    }
}

/// Node attributes.
///
/// Merge rule: `Some` scalars from a later `add_node` override earlier
/// values, `None` leaves them untouched; `labels` are unioned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,

    /// Pre-seeded external risk signal, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Human-readable label derived from `labels` or `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_label: Option<String>,
}

impl NodeAttrs {
    /// Attributes carrying only a node type.
    pub fn typed(node_type: NodeType) -> Self {
        Self {
            node_type: Some(node_type),
            ..Self::default()
        }
    }

    fn merge(&mut self, other: NodeAttrs) {
        if other.node_type.is_some() {
            self.node_type = other.node_type;
        }
        if other.risk_score.is_some() {
            self.risk_score = other.risk_score;
        }
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.entity_id.is_some() {
            self.entity_id = other.entity_id;
        }
        if other.display_label.is_some() {
            self.display_label = other.display_label;
        }
        self.labels.extend(other.labels);
    }
}

/// Aggregated edge attributes for one ordered (source, target) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeAttrs {
    /// Count of underlying transfers
    pub weight: u64,

    /// Cumulative amount moved, in the unit supplied by the caller
    pub volume: f64,

    /// Token identifiers seen on this edge
    pub tokens: BTreeSet<String>,

    /// Earliest contributing transfer timestamp
    pub first_time: DateTime<Utc>,

    /// Latest contributing transfer timestamp
    pub last_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) id: String,
    pub(crate) attrs: NodeAttrs,
}

/// JSON export of a graph: all attribute values are JSON-serializable and
/// set-typed attributes come out as sorted lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: String,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeExport {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub attrs: EdgeAttrs,
}

/// The directed, attribute-rich transfer graph.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    graph: DiGraph<NodeData, EdgeAttrs>,
    node_map: HashMap<String, NodeIndex>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the node if absent, otherwise merge `attrs` into it.
    pub fn add_node(&mut self, id: &str, attrs: NodeAttrs) -> NodeIndex {
        match self.node_map.get(id) {
            Some(&idx) => {
                self.graph[idx].attrs.merge(attrs);
                idx
            }
            None => {
                let idx = self.graph.add_node(NodeData {
                    id: id.to_string(),
                    attrs,
                });
                self.node_map.insert(id.to_string(), idx);
                idx
            }
        }
    }

    /// Record one or more transfers from `source` to `target`.
    ///
    /// Creates missing endpoint nodes with default attributes. If the edge
    /// already exists, `weight_delta` and `volume_delta` accumulate, the
    /// token joins the edge's token set, `first_time` stays at the minimum
    /// seen and `last_time` only moves forward. Self-loops are legal and
    /// recorded like any other edge.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        weight_delta: u64,
        volume_delta: f64,
        token: Option<&str>,
        timestamp: DateTime<Utc>,
    ) {
        let src = self.get_or_create(source);
        let dst = self.get_or_create(target);

        match self.graph.find_edge(src, dst) {
            Some(edge) => {
                let attrs = &mut self.graph[edge];
                attrs.weight += weight_delta;
                attrs.volume += volume_delta;
                if let Some(token) = token {
                    attrs.tokens.insert(token.to_string());
                }
                if timestamp < attrs.first_time {
                    attrs.first_time = timestamp;
                }
                if timestamp > attrs.last_time {
                    attrs.last_time = timestamp;
                }
            }
            None => {
                let mut tokens = BTreeSet::new();
                if let Some(token) = token {
                    tokens.insert(token.to_string());
                }
                self.graph.add_edge(
                    src,
                    dst,
                    EdgeAttrs {
                        weight: weight_delta,
                        volume: volume_delta,
                        tokens,
                        first_time: timestamp,
                        last_time: timestamp,
                    },
                );
            }
        }
    }

    fn get_or_create(&mut self, id: &str) -> NodeIndex {
        match self.node_map.get(id) {
            Some(&idx) => idx,
            None => self.add_node(id, NodeAttrs::default()),
        }
    }

    // --------------------------------------------------------------------
    // Read accessors
    // --------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.get_edge(source, target).is_some()
    }

    pub fn get_edge(&self, source: &str, target: &str) -> Option<&EdgeAttrs> {
        let src = *self.node_map.get(source)?;
        let dst = *self.node_map.get(target)?;
        let edge = self.graph.find_edge(src, dst)?;
        self.graph.edge_weight(edge)
    }

    pub fn node_attrs(&self, id: &str) -> Option<&NodeAttrs> {
        self.node_map.get(id).map(|&idx| &self.graph[idx].attrs)
    }

    /// Node ids with their attributes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeAttrs)> {
        self.graph
            .node_indices()
            .map(move |idx| (self.graph[idx].id.as_str(), &self.graph[idx].attrs))
    }

    /// Edges as (source id, target id, attributes) triples.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeAttrs)> {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()].id.as_str(),
                self.graph[edge.target()].id.as_str(),
                edge.weight(),
            )
        })
    }

    /// Number of distinct counterparties sending to `idx`.
    pub(crate) fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    /// Number of distinct counterparties receiving from `idx`.
    pub(crate) fn out_degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Outgoing).count()
    }

    pub(crate) fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub(crate) fn node_id(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].id
    }

    pub(crate) fn inner(&self) -> &DiGraph<NodeData, EdgeAttrs> {
        &self.graph
    }

    // --------------------------------------------------------------------
    // Path enumeration
    // --------------------------------------------------------------------

    /// Enumerate simple paths from `source`, bounded by `max_length` edges.
    ///
    /// With a target, only paths ending there are returned; without one,
    /// every simple path leaving `source` (to any reachable node) is. The
    /// bound is the only safety valve against exponential blowup, which is
    /// why it is not optional.
    pub(crate) fn bounded_simple_paths(
        &self,
        source: NodeIndex,
        target: Option<NodeIndex>,
        max_length: usize,
    ) -> Vec<Vec<NodeIndex>> {
        let mut paths = Vec::new();
        if max_length == 0 {
            return paths;
        }

        let mut on_path = vec![false; self.graph.node_count()];
        let mut path = vec![source];
        on_path[source.index()] = true;
        self.path_dfs(target, max_length, &mut path, &mut on_path, &mut paths);
        paths
    }

    fn path_dfs(
        &self,
        target: Option<NodeIndex>,
        max_length: usize,
        path: &mut Vec<NodeIndex>,
        on_path: &mut [bool],
        out: &mut Vec<Vec<NodeIndex>>,
    ) {
        let current = *path.last().unwrap();
        let neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(current, Direction::Outgoing)
            .collect();

        // petgraph iterates neighbors most-recent-first; reverse for
        // insertion-order traversal.
        for &next in neighbors.iter().rev() {
            if on_path[next.index()] {
                continue;
            }
            path.push(next);
            on_path[next.index()] = true;

            match target {
                Some(t) if next == t => out.push(path.clone()),
                Some(_) => {}
                None => out.push(path.clone()),
            }

            if path.len() <= max_length && target.map_or(true, |t| next != t) {
                self.path_dfs(target, max_length, path, on_path, out);
            }

            on_path[next.index()] = false;
            path.pop();
        }
    }

    // --------------------------------------------------------------------
    // Export / import
    // --------------------------------------------------------------------

    /// Export the graph in the `{nodes, edges}` shape consumed by report
    /// and dashboard layers.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .nodes()
            .map(|(id, attrs)| NodeExport {
                id: id.to_string(),
                attrs: attrs.clone(),
            })
            .collect();

        let edges = self
            .edges()
            .map(|(source, target, attrs)| EdgeExport {
                source: source.to_string(),
                target: target.to_string(),
                attrs: attrs.clone(),
            })
            .collect();

        GraphExport { nodes, edges }
    }

    /// Rebuild a graph from a previously exported `{nodes, edges}` payload.
    pub fn from_export(export: &GraphExport) -> Self {
        let mut graph = Self::new();

        for node in &export.nodes {
            if node.id.is_empty() {
                continue;
            }
            graph.add_node(&node.id, node.attrs.clone());
        }

        for edge in &export.edges {
            if edge.source.is_empty() || edge.target.is_empty() {
                continue;
            }
            let src = graph.get_or_create(&edge.source);
            let dst = graph.get_or_create(&edge.target);
            // Imported edges carry pre-aggregated attributes; install them
            // wholesale instead of re-running the merge rules.
            match graph.graph.find_edge(src, dst) {
                Some(existing) => graph.graph[existing] = edge.attrs.clone(),
                None => {
                    graph.graph.add_edge(src, dst, edge.attrs.clone());
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "rebuilt graph from export"
        );
        graph
    }
}
