//! Idempotent application of normalized graphs to a store

use crate::framework::Framework;
use crate::graph::{Label, Node, Relationship};
use crate::storage::{GraphStore, StorageResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// An item the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub item: String,
    pub reason: String,
}

/// Outcome of one [`UpsertEngine::apply`] call. Counts include successes only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub nodes_applied: usize,
    pub relationships_applied: usize,
    pub labels: BTreeMap<Label, usize>,
    pub rejections: Vec<Rejection>,
}

impl ApplyReport {
    pub fn count(&self, label: Label) -> usize {
        self.labels.get(&label).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: ApplyReport) {
        self.nodes_applied += other.nodes_applied;
        self.relationships_applied += other.relationships_applied;
        for (label, n) in other.labels {
            *self.labels.entry(label).or_default() += n;
        }
        self.rejections.extend(other.rejections);
    }
}

/// Applies nodes and relationships; per-item failures are logged and skipped.
pub struct UpsertEngine<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Create the per-label uniqueness constraint and lookup indexes.
    /// Failures are warnings only.
    pub fn ensure_schema(&self, labels: impl IntoIterator<Item = Label>) {
        for label in labels {
            if let Err(e) = self.store.ensure_label_schema(label) {
                warn!(%label, error = %e, "could not ensure label schema");
            }
        }
    }

    /// Apply every node, then every relationship.
    pub fn apply(&self, nodes: &[Node], relationships: &[Relationship]) -> ApplyReport {
        let labels: BTreeSet<Label> = nodes.iter().map(|n| n.label).collect();
        self.ensure_schema(labels);

        let mut report = ApplyReport::default();
        for node in nodes {
            match self.store.upsert_node(node) {
                Ok(()) => {
                    report.nodes_applied += 1;
                    *report.labels.entry(node.label).or_default() += 1;
                }
                Err(e) => {
                    warn!(label = %node.label, key = %node.key, error = %e, "node rejected");
                    report.rejections.push(Rejection {
                        item: format!("{}:{}", node.label, node.key),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for rel in relationships {
            match self.store.upsert_relationship(rel) {
                Ok(()) => report.relationships_applied += 1,
                Err(e) => {
                    debug!(rel_type = %rel.rel_type, source = %rel.source, target = %rel.target, error = %e,
                        "relationship rejected");
                    report.rejections.push(Rejection {
                        item: format!("{} -[{}]-> {}", rel.source, rel.rel_type, rel.target),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            nodes = report.nodes_applied,
            relationships = report.relationships_applied,
            rejected = report.rejections.len(),
            "applied graph"
        );
        report
    }

    /// Remove every node and relationship.
    pub fn wipe(&self) -> StorageResult<()> {
        warn!("wiping knowledge base");
        self.store.clear()
    }

    /// Remove one framework's nodes, its citation node and every incident
    /// relationship. Returns the number of nodes removed.
    pub fn delete_framework(&self, framework: Framework) -> StorageResult<usize> {
        let mut removed = self.store.delete_labels(&framework.labels())?;
        if let Some(schema) = framework.schema() {
            if self.store.delete_node(Label::Citation, schema.citation.reference_name)? {
                removed += 1;
            }
        }
        info!(%framework, removed, "deleted framework");
        Ok(removed)
    }
}
