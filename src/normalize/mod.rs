//! Normalization of source documents into graph nodes and relationships
//!
//! Two paths produce the same [`NormalizedGraph`]: STIX bundles (ATT&CK)
//! and extracted framework trees (CIS, NIST, HIPAA, FFIEC, PCI DSS).
//! Neither touches the store; the upsert engine applies the result.

mod citation;
mod document;
mod stix;

pub use citation::{attack_identifier, extract_citations, ExternalReference};
pub use document::{citation_node, has_root_entries, normalize_document};
pub use stix::{normalize_bundle, KillChainPhase, StixBundle, StixObject};

use crate::graph::{Label, Node, Relationship};
use serde::Serialize;
use std::collections::BTreeMap;

/// Length of the `description_preview` attribute, in characters.
pub const PREVIEW_CHARS: usize = 500;

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub labels: BTreeMap<Label, usize>,
    pub relationships: usize,
    /// Source objects of a type with no label.
    pub other: usize,
    /// Objects or relationships discarded for missing key, name or endpoint.
    pub dropped: usize,
}

impl NormalizeStats {
    pub fn count(&self, label: Label) -> usize {
        self.labels.get(&label).copied().unwrap_or(0)
    }
}

/// Flat output of a normalization run.
#[derive(Debug, Clone, Default)]
pub struct NormalizedGraph {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
    pub stats: NormalizeStats,
}

impl NormalizedGraph {
    fn push_node(&mut self, node: Node) {
        *self.stats.labels.entry(node.label).or_default() += 1;
        self.nodes.push(node);
    }

    fn push_relationship(&mut self, relationship: Relationship) {
        self.stats.relationships += 1;
        self.relationships.push(relationship);
    }

    pub fn nodes_with_label(&self, label: Label) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.label == label)
    }
}

/// First `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
