//! Transaction-flow graph analysis library.
//!
//! Builds a directed, aggregated graph of value transfers between blockchain
//! addresses and surfaces money-laundering routes, mixer usage, dusting
//! attacks and address-poisoning attempts, with numeric risk scores per
//! address.
//!
//! # Analysis stages
//!
//! 1. **Graph construction** ([`builder`]): token-transfer and labeled-entity
//!    batches fold into a [`graph::FlowGraph`]
//! 2. **Pattern detection** ([`patterns`]): bounded cycle/path enumeration
//!    and fan-out/fan-in/hub classification
//! 3. **Metrics** ([`metrics`]): centrality and community partitions
//! 4. **Exfiltration routes** ([`exfiltration`]): ranked paths to mixers,
//!    bridges and other high-risk destinations
//! 5. **Risk scoring** ([`risk`]): bounded per-address scores plus
//!    dusting/poisoning detectors over raw transfer rows
//!
//! Data collection, persistence and report rendering belong to external
//! collaborators; one analysis run builds one in-memory graph from a finite
//! record batch and the analyzers read it without mutating it.
//!
//! # Example
//!
//! ```no_run
//! use flow_analyzer::builder::GraphBuilder;
//! use flow_analyzer::config::AnalyzerConfig;
//! use flow_analyzer::patterns::PatternDetector;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AnalyzerConfig::load()?;
//!     let records = Vec::new(); // supplied by an external collector
//!     let mut builder = GraphBuilder::new();
//!     builder.add_token_transfers(&records)?;
//!     let graph = builder.finish();
//!
//!     let detector = PatternDetector::new(config.patterns);
//!     for finding in detector.detect_suspicious_patterns(&graph) {
//!         println!("{}: {}", finding.kind, finding.description);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod exfiltration;
pub mod graph;
pub mod metrics;
pub mod patterns;
pub mod risk;
pub mod schemas;

// Re-export commonly used types
pub use builder::{DataError, GraphBuilder};
pub use config::AnalyzerConfig;
pub use exfiltration::ExfiltrationAnalyzer;
pub use graph::{EdgeAttrs, FlowGraph, NodeAttrs, NodeType};
pub use metrics::{CommunityStrategy, GraphMetrics};
pub use patterns::PatternDetector;
pub use schemas::{
    CentralityScores, EntityRecord, ExfiltrationRoute, PatternFinding, PoisoningMatch,
    TokenTransferRecord, TransferDirection,
};
