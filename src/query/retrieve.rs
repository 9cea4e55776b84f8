//! Keyword retrieval scoped by category, rendered as model context

use crate::framework::Scope;
use crate::graph::{Label, Node};
use crate::normalize::truncate_chars;
use crate::storage::{GraphStore, MatchFields, NodeFilter};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PER_CATEGORY_LIMIT: usize = 5;
pub const BROAD_LIMIT: usize = 10;
pub const NO_RESULTS: &str = "No relevant information found in the knowledge base.";

const DESCRIPTION_CHARS: usize = 300;
const BROAD_DESCRIPTION_CHARS: usize = 200;
const BROAD_KEYWORDS: usize = 2;

pub struct SelectiveRetriever {
    store: Arc<dyn GraphStore>,
}

impl SelectiveRetriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Render matches for every requested category the scope allows.
    ///
    /// Falls back to a name/description search across all labels, and
    /// finally to [`NO_RESULTS`]. Never returns an empty string.
    pub fn retrieve(&self, keywords: &[String], categories: &[Label], scope: Scope) -> String {
        let keywords: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return NO_RESULTS.to_string();
        }

        let mut blocks: Vec<String> = Vec::new();
        for label in scope.allowed_labels().into_iter().filter(|l| categories.contains(l)) {
            let filter = NodeFilter::new()
                .with_label(label)
                .with_keywords(keywords.iter().copied())
                .with_fields(MatchFields {
                    aliases: label.has_aliases(),
                    ..MatchFields::ALL
                })
                .with_limit(PER_CATEGORY_LIMIT);
            let nodes = self.find(&filter);
            debug!(%label, matches = nodes.len(), "category search");
            if nodes.is_empty() {
                continue;
            }

            let mut lines = vec![format!("=== {} ===", label.section_heading())];
            for node in &nodes {
                lines.extend(render_node(node));
            }
            blocks.push(lines.join("\n"));
        }

        if !blocks.is_empty() {
            return blocks.join("\n\n");
        }
        self.broad_search(&keywords).unwrap_or_else(|| NO_RESULTS.to_string())
    }

    fn broad_search(&self, keywords: &[&str]) -> Option<String> {
        let labels = Label::ALL.iter().copied().filter(|l| l.category().is_some());
        let filter = NodeFilter::new()
            .with_labels(labels)
            .with_keywords(keywords.iter().take(BROAD_KEYWORDS).copied())
            .with_fields(MatchFields::NAME_AND_DESCRIPTION)
            .with_limit(BROAD_LIMIT);
        let nodes = self.find(&filter);
        if nodes.is_empty() {
            return None;
        }

        let mut lines = vec!["=== BROADER SEARCH RESULTS ===".to_string()];
        for node in &nodes {
            lines.push(format!(
                "\n{}: {}",
                node.label.display_name(),
                node.name().or(node.identifier()).unwrap_or(&node.key)
            ));
            if let Some(description) = node.description().filter(|d| !d.is_empty()) {
                lines.push(format!(
                    "Description: {}...",
                    truncate_chars(description, BROAD_DESCRIPTION_CHARS)
                ));
            }
        }
        Some(lines.join("\n"))
    }

    fn find(&self, filter: &NodeFilter) -> Vec<Node> {
        self.store.find_nodes(filter).unwrap_or_else(|e| {
            warn!(error = %e, "retrieval query failed");
            Vec::new()
        })
    }
}

/// Attributes shown per label, as (property, caption).
fn shown_attributes(label: Label) -> &'static [(&'static str, &'static str)] {
    match label {
        Label::Technique => &[("tactics", "Tactics"), ("platforms", "Platforms")],
        Label::Malware | Label::Tool => &[("labels", "Labels"), ("platforms", "Platforms")],
        Label::ThreatGroup => &[("aliases", "Aliases")],
        Label::Campaign => &[("aliases", "Aliases"), ("first_seen", "First Seen"), ("last_seen", "Last Seen")],
        Label::DataSource => &[("platforms", "Platforms"), ("collection_layers", "Collection Layers")],
        Label::Tactic => &[("short_name", "Short Name")],
        Label::CisSafeguard => &[
            ("asset_type", "Asset Type"),
            ("security_function", "Security Function"),
            ("implementation_groups", "Implementation Groups"),
        ],
        Label::HipaaRegulation => &[("cfr_reference", "CFR Reference")],
        Label::HipaaRequirement => &[("entity_type", "Entity Type"), ("information_type", "Information Type")],
        Label::FfiecExaminationStep => &[("risk_area", "Risk Area"), ("control_objective", "Control Objective")],
        Label::PciDssTestingProcedure => &[("guidance", "Guidance")],
        _ => &[],
    }
}

/// One match: a blank line, the heading, attributes, description, citations.
fn render_node(node: &Node) -> Vec<String> {
    let display = node.label.display_name();
    let heading = match (node.identifier(), node.name()) {
        (Some(id), Some(name)) if id != name => format!("{display}: {id} - {name}"),
        (_, Some(name)) => format!("{display}: {name}"),
        (Some(id), None) => format!("{display}: {id}"),
        (None, None) => format!("{display}: {}", node.key),
    };
    let mut lines = vec![format!("\n{heading}")];

    for (property, caption) in shown_attributes(node.label) {
        let values = node.get_list(property);
        // Technique tactics and platforms are always shown, even when empty.
        if values.is_empty() && node.label != Label::Technique {
            continue;
        }
        lines.push(format!("{caption}: {}", values.join(", ")));
    }

    if let Some(description) = node.description().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {}...", truncate_chars(description, DESCRIPTION_CHARS)));
    }
    if !node.citations.is_empty() {
        lines.push(format!("Citations: {} references available", node.citations.len()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Framework;
    use crate::graph::Citation;
    use crate::storage::{OpenStore, SqliteStore};

    fn store_with_technique() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_node(
                &Node::new(Label::Technique, "attack-pattern--1")
                    .with_property("identifier", "T1055")
                    .with_property("name", "Process Injection")
                    .with_property("description", "Adversaries may inject code into processes.")
                    .with_property("tactics", vec!["defense-evasion", "privilege-escalation"])
                    .with_property("platforms", vec!["Windows"])
                    .with_citations(vec![Citation {
                        id: Some("T1055".into()),
                        source: Some("mitre-attack".into()),
                        url: None,
                    }]),
            )
            .unwrap();
        store
    }

    #[test]
    fn renders_technique_block() {
        let retriever = SelectiveRetriever::new(store_with_technique());
        let context = retriever.retrieve(&["T1055".to_string()], &[Label::Technique], Scope::All);
        assert_eq!(
            context,
            "=== ATT&CK TECHNIQUES ===\n\
             \nTechnique: T1055 - Process Injection\n\
             Tactics: defense-evasion, privilege-escalation\n\
             Platforms: Windows\n\
             Description: Adversaries may inject code into processes....\n\
             Citations: 1 references available"
        );
    }

    #[test]
    fn categories_outside_scope_are_not_searched() {
        let retriever = SelectiveRetriever::new(store_with_technique());
        let context = retriever.retrieve(
            &["T1055".to_string()],
            &[Label::Technique],
            Scope::Only(Framework::Cis),
        );
        // identifier is excluded from the broad search
        assert_eq!(context, NO_RESULTS);
    }

    #[test]
    fn broad_search_uses_first_two_keywords() {
        let retriever = SelectiveRetriever::new(store_with_technique());
        let context = retriever.retrieve(
            &["nothing".to_string(), "injection".to_string(), "ignored".to_string()],
            &[Label::Mitigation],
            Scope::All,
        );
        assert!(context.starts_with("=== BROADER SEARCH RESULTS ==="));
        assert!(context.contains("\nTechnique: Process Injection"));
    }

    #[test]
    fn empty_store_returns_sentinel() {
        let retriever = SelectiveRetriever::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        assert_eq!(retriever.retrieve(&["anything".to_string()], &[Label::Technique], Scope::All), NO_RESULTS);
        assert_eq!(retriever.retrieve(&[], &[Label::Technique], Scope::All), NO_RESULTS);
    }

    #[test]
    fn blocks_are_separated_and_capped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..7 {
            store
                .upsert_node(
                    &Node::new(Label::Malware, format!("malware--{i}"))
                        .with_property("name", format!("Loader {i}"))
                        .with_property("description", "A loader"),
                )
                .unwrap();
        }
        store
            .upsert_node(
                &Node::new(Label::ThreatGroup, "intrusion-set--1")
                    .with_property("name", "APT29")
                    .with_property("aliases", vec!["Cozy Bear", "Loader Crew"])
                    .with_property("description", "A group"),
            )
            .unwrap();

        let retriever = SelectiveRetriever::new(store);
        let context = retriever.retrieve(
            &["loader".to_string()],
            &[Label::ThreatGroup, Label::Malware],
            Scope::Only(Framework::Attack),
        );
        assert_eq!(context.matches("\nMalware: Loader").count(), PER_CATEGORY_LIMIT);
        assert!(context.contains("\n\n=== THREAT GROUPS ==="));
        assert!(context.contains("Aliases: Cozy Bear, Loader Crew"));
        assert!(context.find("=== MALWARE ===").unwrap() < context.find("=== THREAT GROUPS ===").unwrap());
    }
}
