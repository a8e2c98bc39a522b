//! Centrality and community metrics.
//!
//! Each centrality metric is computed independently: a metric whose
//! algorithm fails (e.g. pagerank non-convergence on a degenerate graph)
//! defaults to 0.0 for every node instead of aborting the call, so results
//! are always total over all nodes. Community detection is pluggable via
//! [`CommunityStrategy`].

use crate::config::CommunityAlgorithm;
use crate::graph::FlowGraph;
use crate::schemas::CentralityScores;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};

const PAGERANK_DAMPING: f64 = 0.85;
const PAGERANK_MAX_ITER: usize = 100;
const PAGERANK_TOL: f64 = 1e-6;

/// Metric computations over a built [`FlowGraph`].
pub struct GraphMetrics {
    community: Box<dyn CommunityStrategy>,
}

impl GraphMetrics {
    pub fn new(algorithm: CommunityAlgorithm) -> Self {
        let community: Box<dyn CommunityStrategy> = match algorithm {
            CommunityAlgorithm::Modularity => Box::new(ModularityCommunities),
            CommunityAlgorithm::ConnectedComponents => Box::new(ConnectedComponentCommunities),
        };
        Self { community }
    }

    /// Use a caller-supplied community strategy.
    pub fn with_strategy(strategy: Box<dyn CommunityStrategy>) -> Self {
        Self {
            community: strategy,
        }
    }

    /// Compute degree, in-degree, out-degree, betweenness and pagerank for
    /// every node. Degree-family metrics are normalized by `n - 1`; a graph
    /// too small to normalize gets zeros rather than degenerate values.
    pub fn calculate_centrality(&self, graph: &FlowGraph) -> BTreeMap<String, CentralityScores> {
        let n = graph.node_count();
        let mut scores: BTreeMap<String, CentralityScores> = graph
            .nodes()
            .map(|(id, _)| (id.to_string(), CentralityScores::default()))
            .collect();
        if n <= 1 {
            return scores;
        }

        let inner = graph.inner();
        let norm = 1.0 / (n as f64 - 1.0);
        for idx in inner.node_indices() {
            let id = graph.node_id(idx);
            let in_deg = graph.in_degree(idx);
            let out_deg = graph.out_degree(idx);
            if let Some(entry) = scores.get_mut(id) {
                entry.degree = (in_deg + out_deg) as f64 * norm;
                entry.in_degree = in_deg as f64 * norm;
                entry.out_degree = out_deg as f64 * norm;
            }
        }

        let betweenness = betweenness_centrality(graph);
        for idx in inner.node_indices() {
            if let Some(entry) = scores.get_mut(graph.node_id(idx)) {
                entry.betweenness = betweenness[idx.index()];
            }
        }

        match pagerank(graph) {
            Ok(ranks) => {
                for idx in inner.node_indices() {
                    if let Some(entry) = scores.get_mut(graph.node_id(idx)) {
                        entry.pagerank = ranks[idx.index()];
                    }
                }
            }
            Err(iterations) => {
                warn!(
                    iterations,
                    "pagerank failed to converge; defaulting to 0.0 for all nodes"
                );
            }
        }

        info!(nodes = scores.len(), "centrality computation complete");
        scores
    }

    /// Partition nodes into communities with the configured strategy.
    pub fn identify_communities(&self, graph: &FlowGraph) -> BTreeMap<String, Vec<String>> {
        let communities = self.community.partition(graph);
        info!(
            strategy = self.community.name(),
            communities = communities.len(),
            "community detection complete"
        );
        communities
    }
}

// ============================================================================
// Centrality algorithms
// ============================================================================

/// Brandes' betweenness centrality (directed, unweighted), normalized by
/// `(n - 1)(n - 2)`.
fn betweenness_centrality(graph: &FlowGraph) -> Vec<f64> {
    let inner = graph.inner();
    let n = inner.node_count();
    let mut centrality = vec![0.0; n];
    if n < 3 {
        return centrality;
    }

    for s in inner.node_indices() {
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        let mut queue = VecDeque::new();

        sigma[s.index()] = 1.0;
        dist[s.index()] = 0;
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in inner.neighbors_directed(v, Direction::Outgoing) {
                if dist[w.index()] < 0 {
                    dist[w.index()] = dist[v.index()] + 1;
                    queue.push_back(w);
                }
                if dist[w.index()] == dist[v.index()] + 1 {
                    sigma[w.index()] += sigma[v.index()];
                    predecessors[w.index()].push(v.index());
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            let w = w.index();
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s.index() {
                centrality[w] += delta[w];
            }
        }
    }

    let scale = 1.0 / ((n as f64 - 1.0) * (n as f64 - 2.0));
    for value in &mut centrality {
        *value *= scale;
    }
    centrality
}

/// Power-iteration pagerank weighted by edge transfer counts.
///
/// Returns the iteration count it gave up at when the L1 residual never
/// drops below tolerance.
fn pagerank(graph: &FlowGraph) -> Result<Vec<f64>, usize> {
    let inner = graph.inner();
    let n = inner.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut out_weight = vec![0.0f64; n];
    for edge in inner.edge_references() {
        out_weight[edge.source().index()] += edge.weight().weight as f64;
    }

    let uniform = 1.0 / n as f64;
    let mut ranks = vec![uniform; n];

    for iteration in 0..PAGERANK_MAX_ITER {
        let last = ranks.clone();
        ranks.iter_mut().for_each(|r| *r = 0.0);

        let dangling: f64 = last
            .iter()
            .enumerate()
            .filter(|(i, _)| out_weight[*i] == 0.0)
            .map(|(_, r)| r)
            .sum();

        for edge in inner.edge_references() {
            let src = edge.source().index();
            let dst = edge.target().index();
            if out_weight[src] > 0.0 {
                ranks[dst] +=
                    PAGERANK_DAMPING * last[src] * edge.weight().weight as f64 / out_weight[src];
            }
        }

        let base = (1.0 - PAGERANK_DAMPING) * uniform + PAGERANK_DAMPING * dangling * uniform;
        for rank in &mut ranks {
            *rank += base;
        }

        let err: f64 = ranks
            .iter()
            .zip(&last)
            .map(|(a, b)| (a - b).abs())
            .sum();
        if err < n as f64 * PAGERANK_TOL {
            debug!(iteration, "pagerank converged");
            return Ok(ranks);
        }
    }

    Err(PAGERANK_MAX_ITER)
}

// ============================================================================
// Community detection
// ============================================================================

/// A pluggable node-partitioning algorithm over the undirected projection
/// of the graph.
pub trait CommunityStrategy {
    fn name(&self) -> &'static str;

    /// Map community id → member node ids. Must cover every node exactly
    /// once; community ids are numbered by discovery order.
    fn partition(&self, graph: &FlowGraph) -> BTreeMap<String, Vec<String>>;
}

/// Louvain modularity clustering over the undirected projection, with edge
/// transfer counts as weights.
pub struct ModularityCommunities;

impl CommunityStrategy for ModularityCommunities {
    fn name(&self) -> &'static str {
        "modularity"
    }

    fn partition(&self, graph: &FlowGraph) -> BTreeMap<String, Vec<String>> {
        let n = graph.node_count();
        if n == 0 {
            return BTreeMap::new();
        }

        let membership = louvain(&UndirectedWeights::from_graph(graph));
        group_by_community(graph, &membership)
    }
}

/// Weakly-connected-component partitioning: each component becomes one
/// community, numbered by discovery order.
///
/// This is a capability substitution for modularity clustering with a
/// different statistical meaning — a sparse chain and a dense clique of the
/// same nodes produce the same single community.
pub struct ConnectedComponentCommunities;

impl CommunityStrategy for ConnectedComponentCommunities {
    fn name(&self) -> &'static str {
        "connected_components"
    }

    fn partition(&self, graph: &FlowGraph) -> BTreeMap<String, Vec<String>> {
        let inner = graph.inner();
        let n = inner.node_count();
        let mut membership = vec![usize::MAX; n];
        let mut next = 0usize;

        for start in inner.node_indices() {
            if membership[start.index()] != usize::MAX {
                continue;
            }
            let mut queue = VecDeque::from([start]);
            membership[start.index()] = next;
            while let Some(v) = queue.pop_front() {
                for w in inner.neighbors_undirected(v) {
                    if membership[w.index()] == usize::MAX {
                        membership[w.index()] = next;
                        queue.push_back(w);
                    }
                }
            }
            next += 1;
        }

        group_by_community(graph, &membership)
    }
}

fn group_by_community(graph: &FlowGraph, membership: &[usize]) -> BTreeMap<String, Vec<String>> {
    // Renumber communities by the first node (in insertion order) they
    // contain, so ids are stable across runs.
    let mut renumber: HashMap<usize, usize> = HashMap::new();
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for idx in graph.inner().node_indices() {
        let raw = membership[idx.index()];
        let next_id = renumber.len();
        let id = *renumber.entry(raw).or_insert(next_id);
        result
            .entry(id.to_string())
            .or_default()
            .push(graph.node_id(idx).to_string());
    }
    result
}

/// Symmetric weighted adjacency for the undirected projection, with
/// self-loop weights kept separate.
struct UndirectedWeights {
    adjacency: Vec<HashMap<usize, f64>>,
    loops: Vec<f64>,
}

impl UndirectedWeights {
    fn from_graph(graph: &FlowGraph) -> Self {
        let n = graph.node_count();
        let mut weights = Self {
            adjacency: vec![HashMap::new(); n],
            loops: vec![0.0; n],
        };
        for edge in graph.inner().edge_references() {
            let u = edge.source().index();
            let v = edge.target().index();
            let w = edge.weight().weight as f64;
            weights.add(u, v, w);
        }
        weights
    }

    fn add(&mut self, u: usize, v: usize, w: f64) {
        if u == v {
            self.loops[u] += w;
        } else {
            *self.adjacency[u].entry(v).or_insert(0.0) += w;
            *self.adjacency[v].entry(u).or_insert(0.0) += w;
        }
    }

    fn node_count(&self) -> usize {
        self.loops.len()
    }

    /// Weighted degree; self-loops count twice, by convention.
    fn degree(&self, i: usize) -> f64 {
        self.adjacency[i].values().sum::<f64>() + 2.0 * self.loops[i]
    }
}

/// Louvain method: local modularity-gain moves followed by graph
/// aggregation, repeated until the partition stops improving. Returns the
/// community index per node.
fn louvain(weights: &UndirectedWeights) -> Vec<usize> {
    const MIN_GAIN: f64 = 1e-9;

    let n = weights.node_count();
    let mut membership: Vec<usize> = (0..n).collect();

    let m2: f64 = (0..n).map(|i| weights.degree(i)).sum();
    if m2 == 0.0 {
        // No edges: every node is its own community
        return membership;
    }

    let mut level = aggregate(weights, &membership, n);
    loop {
        let mut assignments = local_moving(&level, m2, MIN_GAIN);
        let community_count = renumber(&mut assignments);

        // Fold this level's assignment into the node-level membership
        for entry in membership.iter_mut() {
            *entry = assignments[*entry];
        }

        if community_count == level.node_count() {
            // No merge happened at this level; the partition is stable
            break;
        }
        level = aggregate(&level, &assignments, community_count);
    }

    membership
}

/// Renumber community labels to 0..k by first appearance; returns k.
fn renumber(membership: &mut [usize]) -> usize {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    for entry in membership.iter_mut() {
        let next = mapping.len();
        *entry = *mapping.entry(*entry).or_insert(next);
    }
    mapping.len()
}

/// One Louvain level: greedily move nodes between communities while any
/// move improves modularity. Returns the community per (super-)node.
fn local_moving(weights: &UndirectedWeights, m2: f64, min_gain: f64) -> Vec<usize> {
    let n = weights.node_count();
    let mut community: Vec<usize> = (0..n).collect();
    let degree: Vec<f64> = (0..n).map(|i| weights.degree(i)).collect();
    let mut sigma_tot: Vec<f64> = degree.clone();

    let mut improved = true;
    while improved {
        improved = false;
        for node in 0..n {
            let current = community[node];
            sigma_tot[current] -= degree[node];

            // Weight from `node` to each neighboring community
            let mut to_community: BTreeMap<usize, f64> = BTreeMap::new();
            to_community.insert(current, 0.0);
            for (&neighbor, &w) in &weights.adjacency[node] {
                *to_community.entry(community[neighbor]).or_insert(0.0) += w;
            }

            let gain_of = |comm: usize, weight_to: f64| {
                weight_to - sigma_tot[comm] * degree[node] / m2
            };

            let mut best_comm = current;
            let mut best_gain = gain_of(current, to_community[&current]);
            for (&comm, &weight_to) in &to_community {
                let gain = gain_of(comm, weight_to);
                if gain > best_gain + min_gain {
                    best_comm = comm;
                    best_gain = gain;
                }
            }

            sigma_tot[best_comm] += degree[node];
            if best_comm != current {
                community[node] = best_comm;
                improved = true;
            }
        }
    }

    community
}

/// Collapse communities into super-nodes, merging parallel edge weights and
/// turning intra-community weight into self-loops.
fn aggregate(
    weights: &UndirectedWeights,
    membership: &[usize],
    community_count: usize,
) -> UndirectedWeights {
    let mut result = UndirectedWeights {
        adjacency: vec![HashMap::new(); community_count],
        loops: vec![0.0; community_count],
    };

    for u in 0..weights.node_count() {
        let cu = membership[u];
        result.loops[cu] += weights.loops[u];
        for (&v, &w) in &weights.adjacency[u] {
            // Each undirected pair is stored twice; process it once
            if v < u {
                continue;
            }
            let cv = membership[v];
            result.add(cu, cv, w);
        }
    }

    result
}
