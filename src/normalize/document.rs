//! Extracted framework tree → graph
//!
//! One walker serves every document framework; the [`FrameworkSchema`]
//! tells it which collection holds each level and what to copy.

use super::{truncate_chars, NormalizedGraph, PREVIEW_CHARS};
use crate::framework::{FrameworkSchema, LevelSchema};
use crate::graph::{Endpoint, Label, Node, PropertyValue, RelType, Relationship};
use serde_json::Value;
use tracing::debug;

/// Whether the tree has at least one entry at its top level.
pub fn has_root_entries(schema: &FrameworkSchema, tree: &Value) -> bool {
    tree.get(schema.root_collection())
        .and_then(Value::as_array)
        .is_some_and(|entries| !entries.is_empty())
}

/// The document's provenance node.
pub fn citation_node(schema: &FrameworkSchema) -> Node {
    let c = &schema.citation;
    Node::new(Label::Citation, c.reference_name)
        .with_property("name", c.reference_name)
        .with_property("reference_name", c.reference_name)
        .with_property("text", c.text)
        .with_property("url", c.url)
        .with_property("publication_date", c.publication_date)
        .with_property("source_type", c.source_type)
        .with_property("source", schema.source)
}

/// Walk `tree` top-down and emit nodes, containment edges, the citation
/// node and one `HAS_CITATION` edge per emitted node.
pub fn normalize_document(schema: &FrameworkSchema, tree: &Value, ingested_at: &str) -> NormalizedGraph {
    let mut graph = NormalizedGraph::default();
    let entries = entries_of(tree, schema.root_collection());
    walk(schema, 0, entries, None, ingested_at, &mut graph);

    let citation = citation_node(schema);
    let citation_endpoint = Endpoint::new(Label::Citation, citation.key.clone());
    let cited: Vec<Endpoint> = graph
        .nodes
        .iter()
        .map(|n| Endpoint::new(n.label, n.key.clone()))
        .collect();

    graph.push_node(citation);
    for endpoint in cited {
        graph.push_relationship(Relationship::new(
            RelType::HasCitation,
            endpoint,
            citation_endpoint.clone(),
        ));
    }
    graph
}

fn walk(
    schema: &FrameworkSchema,
    depth: usize,
    entries: &[Value],
    parent: Option<(&Endpoint, RelType)>,
    ingested_at: &str,
    graph: &mut NormalizedGraph,
) {
    let Some(level) = schema.levels.get(depth) else {
        return;
    };

    for entry in entries {
        let Some(id) = entry_id(entry) else {
            debug!(label = %level.label, "skipping entry without id");
            graph.stats.dropped += 1;
            continue;
        };

        let node = build_node(schema, level, &id, entry, ingested_at);
        let endpoint = Endpoint::new(level.label, id);
        graph.push_node(node);

        if let Some((parent, rel)) = parent {
            graph.push_relationship(Relationship::new(rel, parent.clone(), endpoint.clone()));
        }

        if let (Some(rel), Some(next)) = (level.child_rel, schema.levels.get(depth + 1)) {
            let children = entries_of(entry, next.collection);
            walk(schema, depth + 1, children, Some((&endpoint, rel)), ingested_at, graph);
        }
    }
}

fn build_node(schema: &FrameworkSchema, level: &LevelSchema, id: &str, entry: &Value, ingested_at: &str) -> Node {
    let mut node = Node::new(level.label, id)
        .with_property("identifier", id)
        .with_property("source", schema.source)
        .with_property("ingested_at", ingested_at);

    for field in level.fields {
        if let Some(value) = entry.get(*field).and_then(PropertyValue::from_json) {
            node.set(*field, value);
        }
    }

    if let Some(name) = level
        .name_field
        .and_then(|f| entry.get(f))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
    {
        node.set("name", name);
    }

    if let Some(description) = entry.get("description").and_then(Value::as_str) {
        node.set("description_preview", truncate_chars(description, PREVIEW_CHARS));
    }
    node
}

fn entries_of<'a>(value: &'a Value, collection: &str) -> &'a [Value] {
    value
        .get(collection)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Entry code; numeric ids are accepted and rendered as text.
fn entry_id(entry: &Value) -> Option<String> {
    match entry.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Framework;
    use serde_json::json;

    const NOW: &str = "2026-01-01T00:00:00+00:00";

    fn cis() -> &'static FrameworkSchema {
        Framework::Cis.schema().unwrap()
    }

    #[test]
    fn walks_two_level_tree_with_containment_and_citations() {
        let tree = json!({
            "controls": [{
                "id": "CIS-1",
                "name": "Inventory and Control of Enterprise Assets",
                "description": "Actively manage all enterprise assets.",
                "safeguards": [
                    {"id": "1.1", "description": "Establish asset inventory", "implementation_groups": ["IG1", "IG2"]},
                    {"id": "1.2", "description": "Address unauthorized assets"}
                ]
            }]
        });
        let graph = normalize_document(cis(), &tree, NOW);

        assert_eq!(graph.stats.count(Label::CisControl), 1);
        assert_eq!(graph.stats.count(Label::CisSafeguard), 2);
        assert_eq!(graph.stats.count(Label::Citation), 1);

        let containment = graph
            .relationships
            .iter()
            .filter(|r| r.rel_type.is(RelType::HasSafeguard))
            .count();
        assert_eq!(containment, 2);
        let cited = graph
            .relationships
            .iter()
            .filter(|r| r.rel_type.is(RelType::HasCitation))
            .count();
        assert_eq!(cited, 3);

        let safeguard = graph.nodes.iter().find(|n| n.key == "1.1").unwrap();
        assert_eq!(safeguard.get_list("implementation_groups"), vec!["IG1", "IG2"]);
        assert_eq!(safeguard.get_str("source"), Some("CIS Controls v8.1"));
        assert_eq!(safeguard.get_str("ingested_at"), Some(NOW));
        assert_eq!(safeguard.identifier(), Some("1.1"));
    }

    #[test]
    fn entries_without_id_are_skipped_with_their_subtree() {
        let tree = json!({
            "controls": [
                {"name": "No id", "safeguards": [{"id": "9.9", "description": "orphan"}]},
                {"id": "CIS-2", "name": "Software", "safeguards": [{"description": "no id either"}]}
            ]
        });
        let graph = normalize_document(cis(), &tree, NOW);
        assert_eq!(graph.stats.count(Label::CisControl), 1);
        assert_eq!(graph.stats.count(Label::CisSafeguard), 0);
        assert_eq!(graph.stats.dropped, 2);
        assert!(graph.nodes.iter().all(|n| n.key != "9.9"));
    }

    #[test]
    fn three_level_tree_uses_title_as_name() {
        let hipaa = Framework::Hipaa.schema().unwrap();
        let tree = json!({
            "regulations": [{
                "id": "SECURITY-RULE",
                "title": "Security Rule",
                "cfr_reference": "45 CFR Part 164 Subpart C",
                "sections": [{
                    "id": "164.308",
                    "title": "Administrative safeguards",
                    "requirements": [{"id": "164.308-a-1", "description": "Security management process"}]
                }]
            }]
        });
        let graph = normalize_document(hipaa, &tree, NOW);
        let regulation = graph.nodes.iter().find(|n| n.key == "SECURITY-RULE").unwrap();
        assert_eq!(regulation.name(), Some("Security Rule"));
        assert_eq!(regulation.get_str("cfr_reference"), Some("45 CFR Part 164 Subpart C"));

        let types: Vec<&str> = graph
            .relationships
            .iter()
            .filter(|r| !r.rel_type.is(RelType::HasCitation))
            .map(|r| r.rel_type.as_str())
            .collect();
        assert_eq!(types, vec!["HAS_SECTION", "HAS_REQUIREMENT"]);
    }

    #[test]
    fn every_sample_tree_is_usable() {
        for framework in Framework::DOCUMENTS {
            let schema = framework.schema().unwrap();
            let tree = schema.sample_tree();
            assert!(has_root_entries(schema, &tree), "{framework} sample is empty");
            let graph = normalize_document(schema, &tree, NOW);
            for label in schema.labels() {
                assert!(graph.stats.count(label) > 0, "{framework} sample has no {label}");
            }
        }
    }

    #[test]
    fn root_entries_check() {
        assert!(!has_root_entries(cis(), &json!({})));
        assert!(!has_root_entries(cis(), &json!({"controls": []})));
        assert!(has_root_entries(cis(), &json!({"controls": [{"id": "CIS-1"}]})));
    }
}
