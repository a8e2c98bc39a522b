//! Data schemas for the flow analyzer.
//!
//! Input rows are produced by external collectors (transfer and entity
//! tables); output records are consumed by report/dashboard layers. This
//! module serves as the canonical schema definition for the whole crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for tracking changes
pub const SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// PART A: Input rows
// ============================================================================

/// Direction of a token transfer relative to the owning address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Sent,
    Received,
    /// Any unrecognized direction value. Skipped at ingestion with a warning.
    #[serde(other)]
    Unknown,
}

/// One token transfer row as supplied by an external collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransferRecord {
    /// Owning address of the account the row was collected for
    pub owner: String,

    /// Counterparty token account
    pub token_account: String,

    /// Transfer direction relative to `owner`
    pub direction: TransferDirection,

    /// Token mint address
    pub mint: String,

    /// Amount moved; collectors may report `sent` legs as negative
    pub amount_change: f64,

    /// Block timestamp (UTC)
    pub block_time: DateTime<Utc>,

    /// Transaction signature
    pub signature: String,

    /// Optional USD valuation of the transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<f64>,
}

/// One labeled-entity row. Any subset of the optional fields may be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    pub address: String,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

// ============================================================================
// PART B: Pattern findings
// ============================================================================

/// Structural anomaly classes reported by pattern detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Cyclic,
    HubAndSpoke,
    FanOut,
    FanIn,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::Cyclic => write!(f, "cyclic"),
            PatternKind::HubAndSpoke => write!(f, "hub_and_spoke"),
            PatternKind::FanOut => write!(f, "fan_out"),
            PatternKind::FanIn => write!(f, "fan_in"),
        }
    }
}

/// A concrete instance backing a pattern finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PatternExample {
    /// A closed walk of distinct nodes (cycle findings)
    Cycle { nodes: Vec<String> },
    /// A node together with the degree that triggered the check
    NodeDegree { address: String, degree: usize },
}

/// One structural finding with a capped sample of concrete examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFinding {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub description: String,
    pub count: usize,
    pub examples: Vec<PatternExample>,
    /// Risk score in [0, 100]
    pub risk_score: f64,
}

// ============================================================================
// PART C: Exfiltration routes
// ============================================================================

/// Per-hop evidence along an exfiltration route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathHop {
    pub source: String,
    pub target: String,
    pub weight: u64,
    pub volume: f64,
    pub tokens: Vec<String>,
    pub first_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
}

/// A ranked path from a source address to a risk-relevant destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExfiltrationRoute {
    pub source_address: String,
    pub target_address: String,
    /// Number of nodes on the path, endpoints included
    pub path_length: usize,
    pub intermediate_addresses: Vec<String>,
    pub path_transactions: Vec<PathHop>,
    pub total_volume_usd: f64,
    /// Route risk in [0, 100]
    pub risk_score: f64,
    pub target_type: String,
    pub target_risk_score: f64,
}

// ============================================================================
// PART D: Metrics
// ============================================================================

/// Centrality metrics for one node. Degree-family values are normalized
/// to [0, 1] by network convention.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CentralityScores {
    pub degree: f64,
    pub in_degree: f64,
    pub out_degree: f64,
    pub betweenness: f64,
    pub pagerank: f64,
}

// ============================================================================
// PART E: Address-level detections
// ============================================================================

/// A counterparty address flagged as visually similar to a target address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisoningMatch {
    pub similar_address: String,
    /// Similarity score in [0, 1]
    pub similarity: f64,
    pub transaction_count: usize,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_kind_display() {
        assert_eq!(PatternKind::Cyclic.to_string(), "cyclic");
        assert_eq!(PatternKind::HubAndSpoke.to_string(), "hub_and_spoke");
        assert_eq!(PatternKind::FanOut.to_string(), "fan_out");
        assert_eq!(PatternKind::FanIn.to_string(), "fan_in");
    }

    #[test]
    fn test_direction_parses_unknown_values() {
        let d: TransferDirection = serde_json::from_str("\"sent\"").unwrap();
        assert_eq!(d, TransferDirection::Sent);
        let d: TransferDirection = serde_json::from_str("\"received\"").unwrap();
        assert_eq!(d, TransferDirection::Received);
        let d: TransferDirection = serde_json::from_str("\"swap\"").unwrap();
        assert_eq!(d, TransferDirection::Unknown);
    }

    #[test]
    fn test_entity_record_tolerates_missing_fields() {
        let e: EntityRecord = serde_json::from_str(r#"{"address": "addr1"}"#).unwrap();
        assert_eq!(e.address, "addr1");
        assert!(e.labels.is_empty());
        assert!(e.entity_name.is_none());
        assert!(e.entity_id.is_none());
    }

    #[test]
    fn test_schema_version() {
        assert!(!SCHEMA_VERSION.is_empty());
    }
}
