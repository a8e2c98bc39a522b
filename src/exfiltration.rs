//! Exfiltration route discovery.
//!
//! Finds bounded simple paths from a source address to risk-relevant
//! destinations — mixers, bridges, exchange withdrawals, or any node with a
//! pre-seeded risk score above the configured threshold — and ranks them.

use crate::config::ExfiltrationConfig;
use crate::graph::{FlowGraph, NodeType};
use crate::schemas::{ExfiltrationRoute, PathHop};
use petgraph::graph::NodeIndex;
use tracing::{info, warn};

/// Route finder over a built [`FlowGraph`].
pub struct ExfiltrationAnalyzer {
    config: ExfiltrationConfig,
}

impl ExfiltrationAnalyzer {
    pub fn new(config: ExfiltrationConfig) -> Self {
        Self { config }
    }

    /// Find and rank exfiltration routes leaving `source`.
    ///
    /// Each route's `total_volume_usd` is the sum of its hop volumes:
    /// intermediate volumes can diverge from the originating amount through
    /// splitting and merging, so every hop's recorded volume counts as
    /// additive evidence rather than taking a bottleneck minimum. Routes are
    /// sorted by risk score, then volume, both descending. Direct one-hop
    /// transfers are not reported as routes. An unknown source yields an
    /// empty list with a warning.
    pub fn analyze_exfiltration_routes(
        &self,
        graph: &FlowGraph,
        source: &str,
    ) -> Vec<ExfiltrationRoute> {
        let Some(src) = graph.node_index(source) else {
            warn!(source, "source address not in graph");
            return Vec::new();
        };

        let mut routes = Vec::new();

        for target in self.qualifying_destinations(graph, src) {
            for path in graph.bounded_simple_paths(src, Some(target), self.config.max_path_length)
            {
                // A direct edge to the destination is not a layered route
                if path.len() <= 2 {
                    continue;
                }
                routes.push(self.build_route(graph, &path));
            }
        }

        routes.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.total_volume_usd
                        .partial_cmp(&a.total_volume_usd)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        info!(source, routes = routes.len(), "exfiltration analysis complete");
        routes
    }

    /// Nodes that qualify as exfiltration destinations.
    fn qualifying_destinations(&self, graph: &FlowGraph, source: NodeIndex) -> Vec<NodeIndex> {
        graph
            .inner()
            .node_indices()
            .filter(|&idx| idx != source)
            .filter(|&idx| {
                let attrs = &graph.inner()[idx].attrs;
                let risky_score = attrs
                    .risk_score
                    .is_some_and(|score| score >= self.config.high_risk_score);
                let risky_type = matches!(
                    attrs.node_type,
                    Some(NodeType::Mixer | NodeType::Bridge | NodeType::ExchangeWithdrawal)
                );
                risky_score || risky_type
            })
            .collect()
    }

    fn build_route(&self, graph: &FlowGraph, path: &[NodeIndex]) -> ExfiltrationRoute {
        let ids: Vec<String> = path
            .iter()
            .map(|&idx| graph.node_id(idx).to_string())
            .collect();

        let mut hops = Vec::with_capacity(path.len() - 1);
        let mut total_volume = 0.0;

        for pair in path.windows(2) {
            let source_id = graph.node_id(pair[0]);
            let target_id = graph.node_id(pair[1]);
            // The path came from edge traversal, so the edge exists
            if let Some(attrs) = graph.get_edge(source_id, target_id) {
                total_volume += attrs.volume;
                hops.push(PathHop {
                    source: source_id.to_string(),
                    target: target_id.to_string(),
                    weight: attrs.weight,
                    volume: attrs.volume,
                    tokens: attrs.tokens.iter().cloned().collect(),
                    first_time: attrs.first_time,
                    last_time: attrs.last_time,
                });
            }
        }

        let target_attrs = &graph.inner()[*path.last().unwrap()].attrs;
        let target_risk = target_attrs.risk_score.unwrap_or(0.0);
        let target_type = target_attrs
            .node_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        ExfiltrationRoute {
            source_address: ids[0].clone(),
            target_address: ids[ids.len() - 1].clone(),
            path_length: ids.len(),
            intermediate_addresses: ids[1..ids.len() - 1].to_vec(),
            path_transactions: hops,
            total_volume_usd: total_volume,
            risk_score: target_risk.max(self.config.route_risk_floor),
            target_type,
            target_risk_score: target_risk,
        }
    }
}
