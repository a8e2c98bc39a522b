//! Graph construction from tabular records.
//!
//! Ingests token-transfer and labeled-entity batches into a [`FlowGraph`].
//! A malformed transfer batch fails as a whole before the first edge is
//! added; partial ingestion is never attempted.

use crate::graph::{FlowGraph, NodeAttrs, NodeType};
use crate::schemas::{EntityRecord, TokenTransferRecord, TransferDirection};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("transfer batch is missing required fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<String> },
}

/// Builds a [`FlowGraph`] from collector output.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: FlowGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a batch of token transfers.
    ///
    /// A `sent` row becomes an (owner → counterparty) edge, a `received` row
    /// a (counterparty → owner) edge; rows with any other direction are
    /// skipped with a warning. Edge volume accumulates the amount magnitude
    /// so signed `sent` legs do not cancel it. Returns the number of rows
    /// folded into the graph.
    pub fn add_token_transfers(
        &mut self,
        records: &[TokenTransferRecord],
    ) -> Result<usize, DataError> {
        if records.is_empty() {
            warn!("no token transfers to add to graph");
            return Ok(0);
        }

        validate_transfer_batch(records)?;

        let mut added = 0usize;
        for record in records {
            let (source, target) = match record.direction {
                TransferDirection::Sent => {
                    (record.owner.as_str(), record.token_account.as_str())
                }
                TransferDirection::Received => {
                    (record.token_account.as_str(), record.owner.as_str())
                }
                TransferDirection::Unknown => {
                    warn!(
                        signature = %record.signature,
                        "skipping transfer with unrecognized direction"
                    );
                    continue;
                }
            };

            self.graph
                .add_node(source, NodeAttrs::typed(NodeType::Address));
            self.graph
                .add_node(target, NodeAttrs::typed(NodeType::Address));
            self.graph.add_edge(
                source,
                target,
                1,
                record.amount_change.abs(),
                Some(record.mint.as_str()),
                record.block_time,
            );
            added += 1;
        }

        info!(
            transfers = added,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "added token transfers to graph"
        );
        Ok(added)
    }

    /// Merge labeled-entity rows into the graph.
    ///
    /// Creates missing nodes with `node_type = entity`; existing nodes keep
    /// their type and only gain labels and metadata. A display label is
    /// derived from the labels or, failing that, the entity name.
    pub fn add_labeled_entities(&mut self, records: &[EntityRecord]) -> usize {
        let mut added = 0usize;

        for record in records {
            if record.address.is_empty() {
                warn!("skipping entity record without an address");
                continue;
            }

            let display_label = if !record.labels.is_empty() {
                Some(record.labels.join(", "))
            } else {
                record.entity_name.clone()
            };

            let node_type = if self.graph.contains_node(&record.address) {
                None
            } else {
                Some(NodeType::Entity)
            };

            self.graph.add_node(
                &record.address,
                NodeAttrs {
                    node_type,
                    labels: record.labels.iter().cloned().collect::<BTreeSet<_>>(),
                    risk_score: None,
                    name: record.entity_name.clone(),
                    entity_id: record.entity_id.clone(),
                    display_label,
                },
            );
            added += 1;
        }

        info!(entities = added, "added labeled entities to graph");
        added
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Finish building and hand the graph to the analyzers.
    pub fn finish(self) -> FlowGraph {
        self.graph
    }
}

/// Check every row of a batch and report the union of missing field names.
fn validate_transfer_batch(records: &[TokenTransferRecord]) -> Result<(), DataError> {
    let mut missing = BTreeSet::new();

    for record in records {
        if record.owner.is_empty() {
            missing.insert("owner");
        }
        if record.token_account.is_empty() {
            missing.insert("token_account");
        }
        if record.mint.is_empty() {
            missing.insert("mint");
        }
        if record.signature.is_empty() {
            missing.insert("signature");
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DataError::MissingFields {
            fields: missing.into_iter().map(str::to_string).collect(),
        })
    }
}
