//! Structural pattern detection.
//!
//! Enumerates simple cycles and bounded paths and classifies fan-out,
//! fan-in and hub-and-spoke anomalies. Cycle and path enumeration are
//! worst-case exponential, so every entry point takes a mandatory length
//! bound; there is no unbounded variant.

use crate::config::PatternConfig;
use crate::graph::FlowGraph;
use crate::schemas::{PatternExample, PatternFinding, PatternKind};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use tracing::{debug, info, warn};

/// Detector for structural anomalies over a built [`FlowGraph`].
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Enumerate all simple directed cycles of at most `max_length` edges.
    ///
    /// Each cycle is reported once, as its node sequence rotated to start at
    /// the earliest-inserted node. Self-loops count as cycles of length 1.
    pub fn find_cycles(&self, graph: &FlowGraph, max_length: usize) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        if max_length == 0 {
            return cycles;
        }

        let inner = graph.inner();
        let n = inner.node_count();
        let mut on_path = vec![false; n];

        // Rooting each cycle at its minimum-index node dedupes rotations.
        for start in inner.node_indices() {
            let mut path = vec![start];
            on_path[start.index()] = true;
            self.cycle_dfs(graph, start, max_length, &mut path, &mut on_path, &mut cycles);
            on_path[start.index()] = false;
        }

        debug!(count = cycles.len(), max_length, "cycle enumeration complete");
        cycles
    }

    fn cycle_dfs(
        &self,
        graph: &FlowGraph,
        start: NodeIndex,
        max_length: usize,
        path: &mut Vec<NodeIndex>,
        on_path: &mut [bool],
        out: &mut Vec<Vec<String>>,
    ) {
        let current = *path.last().unwrap();
        let neighbors: Vec<NodeIndex> = graph
            .inner()
            .neighbors_directed(current, Direction::Outgoing)
            .collect();

        for &next in neighbors.iter().rev() {
            if next == start {
                out.push(path.iter().map(|&idx| graph.node_id(idx).to_string()).collect());
                continue;
            }
            // Only visit nodes above the root; cycles through lower indices
            // are found from their own root.
            if next < start || on_path[next.index()] {
                continue;
            }
            if path.len() >= max_length {
                continue;
            }
            path.push(next);
            on_path[next.index()] = true;
            self.cycle_dfs(graph, start, max_length, path, on_path, out);
            on_path[next.index()] = false;
            path.pop();
        }
    }

    /// Enumerate simple paths from `source`, bounded by `max_length` edges.
    ///
    /// With a target, only paths ending there are returned; without one,
    /// paths from `source` to every reachable node. A missing source or
    /// target yields an empty result with a warning, not an error.
    pub fn find_paths(
        &self,
        graph: &FlowGraph,
        source: &str,
        target: Option<&str>,
        max_length: usize,
    ) -> Vec<Vec<String>> {
        let Some(src) = graph.node_index(source) else {
            warn!(source, "source node not in graph");
            return Vec::new();
        };

        let dst = match target {
            Some(t) => match graph.node_index(t) {
                Some(idx) => Some(idx),
                None => {
                    warn!(target = t, "target node not in graph");
                    return Vec::new();
                }
            },
            None => None,
        };

        graph
            .bounded_simple_paths(src, dst, max_length)
            .into_iter()
            .map(|path| {
                path.into_iter()
                    .map(|idx| graph.node_id(idx).to_string())
                    .collect()
            })
            .collect()
    }

    /// Run the four independent structural checks and collect findings.
    ///
    /// The checks are additive: a node can appear in several findings, and
    /// each finding carries its own risk score and a capped example sample.
    pub fn detect_suspicious_patterns(&self, graph: &FlowGraph) -> Vec<PatternFinding> {
        let mut findings = Vec::new();
        let cap = self.config.max_examples;

        // Cyclic flows (wash trading / layering)
        let cycles = self.find_cycles(graph, self.config.cycle_max_length);
        if !cycles.is_empty() {
            let count = cycles.len();
            let risk = (50.0 + 10.0 * count.min(5) as f64).min(95.0);
            findings.push(PatternFinding {
                kind: PatternKind::Cyclic,
                description: "Cyclic transaction flows detected".to_string(),
                count,
                examples: cycles
                    .into_iter()
                    .take(cap)
                    .map(|nodes| PatternExample::Cycle { nodes })
                    .collect(),
                risk_score: risk,
            });
        }

        // Hub-and-spoke (relay/aggregation nodes)
        let hubs = self.nodes_by_degree(graph, DegreeKind::Total, self.config.hub_degree_threshold + 1);
        if !hubs.is_empty() {
            let degree_sum: usize = hubs.iter().map(|(_, d)| d).sum();
            let risk = (50.0 + degree_sum as f64 / 10.0).min(90.0);
            findings.push(PatternFinding {
                kind: PatternKind::HubAndSpoke,
                description: "Hub-and-spoke transaction patterns detected".to_string(),
                count: hubs.len(),
                examples: degree_examples(hubs, cap),
                risk_score: risk,
            });
        }

        // Fan-out (one sender, many recipients)
        let fan_out = self.nodes_by_degree(graph, DegreeKind::Out, self.config.fan_out_threshold);
        if !fan_out.is_empty() {
            let degree_sum: usize = fan_out.iter().map(|(_, d)| d).sum();
            let risk = (40.0 + degree_sum as f64 / 5.0).min(85.0);
            findings.push(PatternFinding {
                kind: PatternKind::FanOut,
                description: "Fan-out transaction patterns detected".to_string(),
                count: fan_out.len(),
                examples: degree_examples(fan_out, cap),
                risk_score: risk,
            });
        }

        // Fan-in (many senders, one recipient)
        let fan_in = self.nodes_by_degree(graph, DegreeKind::In, self.config.fan_in_threshold);
        if !fan_in.is_empty() {
            let degree_sum: usize = fan_in.iter().map(|(_, d)| d).sum();
            let risk = (40.0 + degree_sum as f64 / 5.0).min(80.0);
            findings.push(PatternFinding {
                kind: PatternKind::FanIn,
                description: "Fan-in transaction patterns detected".to_string(),
                count: fan_in.len(),
                examples: degree_examples(fan_in, cap),
                risk_score: risk,
            });
        }

        info!(findings = findings.len(), "suspicious pattern detection complete");
        findings
    }

    fn nodes_by_degree(
        &self,
        graph: &FlowGraph,
        kind: DegreeKind,
        min_degree: usize,
    ) -> Vec<(String, usize)> {
        graph
            .inner()
            .node_indices()
            .filter_map(|idx| {
                let degree = match kind {
                    DegreeKind::In => graph.in_degree(idx),
                    DegreeKind::Out => graph.out_degree(idx),
                    DegreeKind::Total => graph.in_degree(idx) + graph.out_degree(idx),
                };
                (degree >= min_degree).then(|| (graph.node_id(idx).to_string(), degree))
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
enum DegreeKind {
    In,
    Out,
    Total,
}

fn degree_examples(nodes: Vec<(String, usize)>, cap: usize) -> Vec<PatternExample> {
    nodes
        .into_iter()
        .take(cap)
        .map(|(address, degree)| PatternExample::NodeDegree { address, degree })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn detector() -> PatternDetector {
        PatternDetector::new(PatternConfig::default())
    }

    fn graph_from_edges(edges: &[(&str, &str)]) -> FlowGraph {
        let mut g = FlowGraph::new();
        for (i, (src, dst)) in edges.iter().enumerate() {
            g.add_edge(
                src,
                dst,
                1,
                1.0,
                Some("mint"),
                Utc.timestamp_opt(i as i64, 0).unwrap(),
            );
        }
        g
    }

    #[test]
    fn test_triangle_yields_exactly_one_cycle() {
        let g = graph_from_edges(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let cycles = detector().find_cycles(&g, 3);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_bound_is_respected_and_monotonic() {
        // Two-cycle a<->b plus a square a->b->c->d->a
        let g = graph_from_edges(&[
            ("a", "b"),
            ("b", "a"),
            ("b", "c"),
            ("c", "d"),
            ("d", "a"),
        ]);

        let short = detector().find_cycles(&g, 2);
        assert_eq!(short.len(), 1);
        assert_eq!(short[0], vec!["a", "b"]);

        let long = detector().find_cycles(&g, 4);
        assert_eq!(long.len(), 2);
        // Everything found at the smaller bound is still found
        assert!(long.contains(&short[0]));
        assert!(long.contains(&vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string()
        ]));
    }

    #[test]
    fn test_self_loop_is_a_length_one_cycle() {
        let g = graph_from_edges(&[("a", "a")]);
        let cycles = detector().find_cycles(&g, 1);
        assert_eq!(cycles, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_find_paths_with_and_without_target() {
        let g = graph_from_edges(&[("a", "b"), ("b", "c"), ("a", "c")]);
        let d = detector();

        let to_c = d.find_paths(&g, "a", Some("c"), 3);
        assert_eq!(to_c.len(), 2);

        let all = d.find_paths(&g, "a", None, 3);
        // a->b, a->b->c, a->c
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_missing_nodes_return_empty_not_error() {
        let g = graph_from_edges(&[("a", "b")]);
        let d = detector();

        assert!(d.find_paths(&g, "ghost", None, 3).is_empty());
        assert!(d.find_paths(&g, "a", Some("ghost"), 3).is_empty());
    }

    #[test]
    fn test_fan_out_finding_for_high_out_degree_node() {
        let mut edges = Vec::new();
        for i in 0..12 {
            edges.push(("hub".to_string(), format!("out{i}")));
        }
        let pairs: Vec<(&str, &str)> =
            edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let g = graph_from_edges(&pairs);

        let findings = detector().detect_suspicious_patterns(&g);

        let fan_out = findings
            .iter()
            .find(|f| f.kind == PatternKind::FanOut)
            .expect("fan_out finding");
        assert_eq!(fan_out.count, 1);
        assert!(fan_out.examples.contains(&PatternExample::NodeDegree {
            address: "hub".to_string(),
            degree: 12
        }));
        // 40 + 12/5
        assert!((fan_out.risk_score - 42.4).abs() < 1e-9);

        // No fan-in: hub has zero in-degree, spokes have in-degree 1
        assert!(findings.iter().all(|f| f.kind != PatternKind::FanIn));
    }

    #[test]
    fn test_fan_in_and_hub_findings() {
        let mut edges = Vec::new();
        for i in 0..11 {
            edges.push((format!("in{i}"), "sink".to_string()));
        }
        for i in 0..10 {
            edges.push(("sink".to_string(), format!("out{i}")));
        }
        let pairs: Vec<(&str, &str)> =
            edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let g = graph_from_edges(&pairs);

        let findings = detector().detect_suspicious_patterns(&g);

        let fan_in = findings
            .iter()
            .find(|f| f.kind == PatternKind::FanIn)
            .expect("fan_in finding");
        assert_eq!(fan_in.count, 1);
        // 40 + 11/5, capped at 80
        assert!((fan_in.risk_score - 42.2).abs() < 1e-9);

        // Total degree 21 > 20 makes sink a hub as well: checks are additive
        let hub = findings
            .iter()
            .find(|f| f.kind == PatternKind::HubAndSpoke)
            .expect("hub finding");
        assert_eq!(hub.count, 1);
        assert!((hub.risk_score - 52.1).abs() < 1e-9);
    }

    #[test]
    fn test_cyclic_finding_risk_saturates() {
        let g = graph_from_edges(&[("a", "b"), ("b", "a")]);
        let findings = detector().detect_suspicious_patterns(&g);

        let cyclic = findings
            .iter()
            .find(|f| f.kind == PatternKind::Cyclic)
            .expect("cyclic finding");
        assert_eq!(cyclic.count, 1);
        // 50 + 10*min(1, 5)
        assert!((cyclic.risk_score - 60.0).abs() < 1e-9);

        // Many cycles: risk caps at 95
        let mut edges = Vec::new();
        for i in 0..8 {
            edges.push((format!("x{i}"), format!("y{i}")));
            edges.push((format!("y{i}"), format!("x{i}")));
        }
        let pairs: Vec<(&str, &str)> =
            edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let many = graph_from_edges(&pairs);
        let findings = detector().detect_suspicious_patterns(&many);
        let cyclic = findings
            .iter()
            .find(|f| f.kind == PatternKind::Cyclic)
            .unwrap();
        assert_eq!(cyclic.count, 8);
        assert!((cyclic.risk_score - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_graph_yields_no_findings() {
        let g = FlowGraph::new();
        assert!(detector().detect_suspicious_patterns(&g).is_empty());
    }

    #[test]
    fn test_example_cap_is_applied() {
        let mut config = PatternConfig::default();
        config.fan_out_threshold = 1;
        config.max_examples = 3;
        let d = PatternDetector::new(config);

        let mut edges = Vec::new();
        for i in 0..6 {
            edges.push((format!("s{i}"), format!("t{i}")));
        }
        let pairs: Vec<(&str, &str)> =
            edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let g = graph_from_edges(&pairs);

        let findings = d.detect_suspicious_patterns(&g);
        let fan_out = findings
            .iter()
            .find(|f| f.kind == PatternKind::FanOut)
            .unwrap();
        assert_eq!(fan_out.count, 6);
        assert_eq!(fan_out.examples.len(), 3);
    }
}
