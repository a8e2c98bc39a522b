//! Flow analyzer CLI.
//!
//! Thin glue around the library: loads collector output from JSON files,
//! runs the analyzers and writes a JSON report. All real work lives in the
//! library modules.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use flow_analyzer::builder::GraphBuilder;
use flow_analyzer::config::AnalyzerConfig;
use flow_analyzer::exfiltration::ExfiltrationAnalyzer;
use flow_analyzer::graph::GraphExport;
use flow_analyzer::metrics::GraphMetrics;
use flow_analyzer::patterns::PatternDetector;
use flow_analyzer::schemas::{
    CentralityScores, EntityRecord, ExfiltrationRoute, PatternFinding, TokenTransferRecord,
};

#[derive(Parser)]
#[command(name = "flow-analyzer")]
#[command(version)]
#[command(about = "Transaction-flow graph analysis for AML investigations", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the transfer graph and run every analyzer
    Analyze {
        /// JSON file with an array of token transfer records
        #[arg(short, long)]
        transfers: PathBuf,

        /// JSON file with an array of labeled entity records
        #[arg(short, long)]
        entities: Option<PathBuf>,

        /// Source address for exfiltration route analysis
        #[arg(short, long)]
        source: Option<String>,

        /// Report output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Everything the analyzers produced for one run.
#[derive(Serialize)]
struct AnalysisReport {
    graph: GraphExport,
    patterns: Vec<PatternFinding>,
    centrality: BTreeMap<String, CentralityScores>,
    communities: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exfiltration_routes: Option<Vec<ExfiltrationRoute>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set up logging")?;

    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AnalyzerConfig::load()?,
    };

    match cli.command {
        Commands::Analyze {
            transfers,
            entities,
            source,
            output,
        } => analyze(&config, &transfers, entities.as_deref(), source.as_deref(), output.as_deref()),
    }
}

fn analyze(
    config: &AnalyzerConfig,
    transfers_path: &Path,
    entities_path: Option<&Path>,
    source: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let transfers: Vec<TokenTransferRecord> = read_json(transfers_path)
        .with_context(|| format!("failed to read transfers from {}", transfers_path.display()))?;
    info!(records = transfers.len(), "loaded transfer batch");

    let mut builder = GraphBuilder::new();
    builder
        .add_token_transfers(&transfers)
        .context("transfer batch rejected")?;

    if let Some(path) = entities_path {
        let records: Vec<EntityRecord> = read_json(path)
            .with_context(|| format!("failed to read entities from {}", path.display()))?;
        builder.add_labeled_entities(&records);
    }

    let graph = builder.finish();
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "graph built"
    );

    let detector = PatternDetector::new(config.patterns.clone());
    let metrics = GraphMetrics::new(config.community);

    let report = AnalysisReport {
        patterns: detector.detect_suspicious_patterns(&graph),
        centrality: metrics.calculate_centrality(&graph),
        communities: metrics.identify_communities(&graph),
        exfiltration_routes: source.map(|address| {
            ExfiltrationAnalyzer::new(config.exfiltration.clone())
                .analyze_exfiltration_routes(&graph, address)
        }),
        graph: graph.export(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "wrote analysis report");
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
