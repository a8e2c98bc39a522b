//! Configuration for the flow analyzer.
//!
//! Every heuristic threshold used by the detectors is a named field here
//! with the calibration defaults baked in, so deployments can override them
//! from a TOML file or the environment without touching code. The defaults
//! are inherited constants, not derived values; treat re-tuning them as an
//! open calibration exercise.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Structural pattern detection thresholds
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Exfiltration route analysis settings
    #[serde(default)]
    pub exfiltration: ExfiltrationConfig,

    /// Risk scoring constants
    #[serde(default)]
    pub risk: RiskScoringConfig,

    /// Community detection strategy
    #[serde(default)]
    pub community: CommunityAlgorithm,
}

/// Thresholds for `PatternDetector::detect_suspicious_patterns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Maximum cycle length (in edges) for the cyclic check
    #[serde(default = "default_cycle_max_length")]
    pub cycle_max_length: usize,

    /// Total degree (in + out) above which a node counts as a hub
    #[serde(default = "default_hub_degree_threshold")]
    pub hub_degree_threshold: usize,

    /// Out-degree at or above which a node counts as fanning out
    #[serde(default = "default_fan_out_threshold")]
    pub fan_out_threshold: usize,

    /// In-degree at or above which a node counts as fanning in
    #[serde(default = "default_fan_in_threshold")]
    pub fan_in_threshold: usize,

    /// Cap on concrete examples attached to one finding
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cycle_max_length: default_cycle_max_length(),
            hub_degree_threshold: default_hub_degree_threshold(),
            fan_out_threshold: default_fan_out_threshold(),
            fan_in_threshold: default_fan_in_threshold(),
            max_examples: default_max_examples(),
        }
    }
}

/// Settings for `ExfiltrationAnalyzer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExfiltrationConfig {
    /// Pre-seeded node risk score at or above which a node qualifies as a
    /// destination regardless of its type
    #[serde(default = "default_high_risk_score")]
    pub high_risk_score: f64,

    /// Maximum route length in edges
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,

    /// Floor applied to every reported route risk score
    #[serde(default = "default_route_risk_floor")]
    pub route_risk_floor: f64,
}

impl Default for ExfiltrationConfig {
    fn default() -> Self {
        Self {
            high_risk_score: default_high_risk_score(),
            max_path_length: default_max_path_length(),
            route_risk_floor: default_route_risk_floor(),
        }
    }
}

/// Constants for `risk::address_risk` and the combined dusting/poisoning
/// score. Weights are fractions of the final score; per-unit values and caps
/// bound each term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScoringConfig {
    #[serde(default = "default_mixer_per_interaction")]
    pub mixer_per_interaction: f64,
    #[serde(default = "default_mixer_cap")]
    pub mixer_cap: f64,
    #[serde(default = "default_mixer_weight")]
    pub mixer_weight: f64,

    #[serde(default = "default_counterparty_per_contact")]
    pub counterparty_per_contact: f64,
    #[serde(default = "default_counterparty_cap")]
    pub counterparty_cap: f64,
    #[serde(default = "default_counterparty_weight")]
    pub counterparty_weight: f64,

    /// USD volume tier breakpoints, ascending
    #[serde(default = "default_volume_breakpoints")]
    pub volume_breakpoints: Vec<f64>,
    /// Raw tier scores, same length as `volume_breakpoints`
    #[serde(default = "default_volume_scores")]
    pub volume_scores: Vec<f64>,
    #[serde(default = "default_volume_scale")]
    pub volume_scale: f64,
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,

    #[serde(default = "default_velocity_per_tx_day")]
    pub velocity_per_tx_day: f64,
    #[serde(default = "default_velocity_cap")]
    pub velocity_cap: f64,
    #[serde(default = "default_velocity_weight")]
    pub velocity_weight: f64,

    #[serde(default = "default_cross_chain_per_tx")]
    pub cross_chain_per_tx: f64,
    #[serde(default = "default_cross_chain_cap")]
    pub cross_chain_cap: f64,
    #[serde(default = "default_cross_chain_weight")]
    pub cross_chain_weight: f64,

    #[serde(default = "default_dusting_per_flag")]
    pub dusting_per_flag: f64,
    #[serde(default = "default_dusting_cap")]
    pub dusting_cap: f64,
    #[serde(default = "default_poisoning_per_flag")]
    pub poisoning_per_flag: f64,
    #[serde(default = "default_poisoning_cap")]
    pub poisoning_cap: f64,
}

impl Default for RiskScoringConfig {
    fn default() -> Self {
        Self {
            mixer_per_interaction: default_mixer_per_interaction(),
            mixer_cap: default_mixer_cap(),
            mixer_weight: default_mixer_weight(),
            counterparty_per_contact: default_counterparty_per_contact(),
            counterparty_cap: default_counterparty_cap(),
            counterparty_weight: default_counterparty_weight(),
            volume_breakpoints: default_volume_breakpoints(),
            volume_scores: default_volume_scores(),
            volume_scale: default_volume_scale(),
            volume_weight: default_volume_weight(),
            velocity_per_tx_day: default_velocity_per_tx_day(),
            velocity_cap: default_velocity_cap(),
            velocity_weight: default_velocity_weight(),
            cross_chain_per_tx: default_cross_chain_per_tx(),
            cross_chain_cap: default_cross_chain_cap(),
            cross_chain_weight: default_cross_chain_weight(),
            dusting_per_flag: default_dusting_per_flag(),
            dusting_cap: default_dusting_cap(),
            poisoning_per_flag: default_poisoning_per_flag(),
            poisoning_cap: default_poisoning_cap(),
        }
    }
}

/// Community detection strategy selection.
///
/// `Modularity` runs Louvain clustering over the undirected projection of
/// the graph. `ConnectedComponents` substitutes weakly-connected-component
/// partitioning — a capability substitution with different statistical
/// meaning (one component = one community regardless of internal density),
/// not an equivalent of modularity clustering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunityAlgorithm {
    #[default]
    Modularity,
    ConnectedComponents,
}

// Default value functions

fn default_cycle_max_length() -> usize {
    4
}

fn default_hub_degree_threshold() -> usize {
    20
}

fn default_fan_out_threshold() -> usize {
    10
}

fn default_fan_in_threshold() -> usize {
    10
}

fn default_max_examples() -> usize {
    100
}

fn default_high_risk_score() -> f64 {
    75.0
}

fn default_max_path_length() -> usize {
    4
}

fn default_route_risk_floor() -> f64 {
    50.0
}

fn default_mixer_per_interaction() -> f64 {
    15.0
}

fn default_mixer_cap() -> f64 {
    70.0
}

fn default_mixer_weight() -> f64 {
    0.3
}

fn default_counterparty_per_contact() -> f64 {
    10.0
}

fn default_counterparty_cap() -> f64 {
    50.0
}

fn default_counterparty_weight() -> f64 {
    0.2
}

fn default_volume_breakpoints() -> Vec<f64> {
    vec![10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0]
}

fn default_volume_scores() -> Vec<f64> {
    vec![10.0, 20.0, 30.0, 40.0, 50.0]
}

fn default_volume_scale() -> f64 {
    0.25
}

fn default_volume_weight() -> f64 {
    0.2
}

fn default_velocity_per_tx_day() -> f64 {
    1.5
}

fn default_velocity_cap() -> f64 {
    30.0
}

fn default_velocity_weight() -> f64 {
    0.2
}

fn default_cross_chain_per_tx() -> f64 {
    4.0
}

fn default_cross_chain_cap() -> f64 {
    20.0
}

fn default_cross_chain_weight() -> f64 {
    0.1
}

fn default_dusting_per_flag() -> f64 {
    12.0
}

fn default_dusting_cap() -> f64 {
    50.0
}

fn default_poisoning_per_flag() -> f64 {
    10.0
}

fn default_poisoning_cap() -> f64 {
    70.0
}

impl AnalyzerConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `FLOW_ANALYZER_COMMUNITY`
    /// (`modularity` | `connected_components`).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(algo) = std::env::var("FLOW_ANALYZER_COMMUNITY") {
            self.community = match algo.as_str() {
                "modularity" => CommunityAlgorithm::Modularity,
                "connected_components" => CommunityAlgorithm::ConnectedComponents,
                other => anyhow::bail!("unknown community algorithm: {other}"),
            };
        }
        Ok(())
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.patterns.cycle_max_length == 0 {
            anyhow::bail!("patterns.cycle_max_length must be > 0");
        }
        if self.exfiltration.max_path_length == 0 {
            anyhow::bail!("exfiltration.max_path_length must be > 0");
        }
        if self.risk.volume_breakpoints.len() != self.risk.volume_scores.len() {
            anyhow::bail!(
                "risk.volume_breakpoints and risk.volume_scores must have the same length"
            );
        }
        if self
            .risk
            .volume_breakpoints
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            anyhow::bail!("risk.volume_breakpoints must be strictly ascending");
        }
        Ok(())
    }
}
