//! STIX 2.x bundle → graph
//!
//! Objects are parsed one at a time so a single malformed entry never
//! rejects the whole bundle.

use super::citation::{attack_identifier, extract_citations, ExternalReference};
use super::{truncate_chars, NormalizedGraph, PREVIEW_CHARS};
use crate::graph::{map_type, Endpoint, Label, Node, PropertyValue, RelType, Relationship, RelationshipType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A STIX bundle, with objects kept raw until normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StixBundle {
    #[serde(default)]
    pub objects: Vec<Value>,
}

impl StixBundle {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KillChainPhase {
    #[serde(default)]
    pub kill_chain_name: String,
    #[serde(default)]
    pub phase_name: String,
}

/// `x_mitre_data_sources` entries are plain names in current releases and
/// objects in some older ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DataSourceEntry {
    Name(String),
    Object { data_source_name: Option<String> },
}

impl DataSourceEntry {
    fn name(&self) -> Option<&str> {
        match self {
            DataSourceEntry::Name(s) => Some(s.as_str()),
            DataSourceEntry::Object { data_source_name } => data_source_name.as_deref(),
        }
    }
}

/// The subset of STIX/ATT&CK attributes the graph keeps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StixObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
    #[serde(default)]
    pub kill_chain_phases: Vec<KillChainPhase>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    #[serde(default)]
    x_mitre_platforms: Vec<String>,
    #[serde(default)]
    x_mitre_data_sources: Vec<DataSourceEntry>,
    #[serde(default)]
    x_mitre_permissions_required: Vec<String>,
    #[serde(default)]
    x_mitre_effective_permissions: Vec<String>,
    #[serde(default)]
    x_mitre_system_requirements: Vec<String>,
    #[serde(default)]
    x_mitre_defense_bypassed: Vec<String>,
    #[serde(default)]
    x_mitre_collection_layers: Vec<String>,
    x_mitre_detection: Option<String>,
    x_mitre_version: Option<String>,
    x_mitre_shortname: Option<String>,
    x_mitre_data_source_ref: Option<String>,
    // relationship objects
    pub relationship_type: Option<String>,
    pub source_ref: Option<String>,
    pub target_ref: Option<String>,
}

impl StixObject {
    fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Normalize every object in a bundle.
///
/// Nodes come first in bundle order, followed by synthesized tactics.
/// Relationships are emitted only when both endpoints resolved to a node in
/// this run; everything else is dropped and counted.
pub fn normalize_bundle(bundle: &StixBundle) -> NormalizedGraph {
    let mut graph = NormalizedGraph::default();

    let mut objects = Vec::with_capacity(bundle.objects.len());
    for raw in &bundle.objects {
        match serde_json::from_value::<StixObject>(raw.clone()) {
            Ok(obj) => objects.push(obj),
            Err(e) => {
                debug!(error = %e, "unparseable STIX object");
                graph.stats.other += 1;
            }
        }
    }

    // STIX id → endpoint, for every node emitted in this run
    let mut index: HashMap<String, Endpoint> = HashMap::new();
    let mut relationship_objects = Vec::new();

    for obj in &objects {
        if obj.kind == "relationship" {
            relationship_objects.push(obj);
            continue;
        }
        let Some(label) = map_type(&obj.kind) else {
            graph.stats.other += 1;
            continue;
        };
        match build_node(label, obj) {
            Some(node) => {
                index.insert(obj.id.clone(), Endpoint::new(node.label, node.key.clone()));
                graph.push_node(node);
            }
            None => {
                debug!(stix_id = %obj.id, kind = %obj.kind, "dropping object without id or name");
                graph.stats.dropped += 1;
            }
        }
    }

    synthesize_tactics(&mut graph);
    link_subtechniques(&mut graph);

    for obj in objects.iter().filter(|o| o.kind == "x-mitre-data-component") {
        let (Some(component), Some(source_ref)) = (index.get(&obj.id), obj.x_mitre_data_source_ref.as_ref()) else {
            continue;
        };
        match index.get(source_ref) {
            Some(source) if source.label == Label::DataSource => {
                let rel = Relationship::new(RelType::BelongsToDataSource, component.clone(), source.clone());
                graph.push_relationship(rel);
            }
            _ => graph.stats.dropped += 1,
        }
    }

    for obj in relationship_objects {
        match build_relationship(obj, &index) {
            Some(rel) => graph.push_relationship(rel),
            None => {
                debug!(stix_id = %obj.id, "dropping dangling relationship");
                graph.stats.dropped += 1;
            }
        }
    }

    graph
}

fn build_relationship(obj: &StixObject, index: &HashMap<String, Endpoint>) -> Option<Relationship> {
    let rel_type = obj.relationship_type.as_deref().filter(|t| !t.is_empty())?;
    let source = index.get(obj.source_ref.as_deref()?)?;
    let target = index.get(obj.target_ref.as_deref()?)?;

    let mut rel = Relationship::new(RelationshipType::from_stix(rel_type), source.clone(), target.clone());
    if let Some(description) = obj.description.as_deref().filter(|d| !d.is_empty()) {
        rel = rel.with_property("description", description);
    }
    if let Some(created) = obj.created.as_deref() {
        rel = rel.with_property("created", created);
    }
    Some(rel)
}

fn build_node(label: Label, obj: &StixObject) -> Option<Node> {
    if obj.id.is_empty() {
        return None;
    }
    let name = obj.display_name()?;

    // Tactic objects share the synthesized key so both collapse to one node.
    let key = match (label, obj.x_mitre_shortname.as_deref()) {
        (Label::Tactic, Some(short)) if !short.is_empty() => tactic_key(short),
        _ => obj.id.clone(),
    };

    let description = obj.description.as_deref().unwrap_or_default();
    let mut node = Node::new(label, key)
        .with_property("stix_id", obj.id.as_str())
        .with_property("name", name)
        .with_property("description", description)
        .with_property("description_preview", truncate_chars(description, PREVIEW_CHARS))
        .with_citations(extract_citations(&obj.external_references));
    set_opt(&mut node, "created", &obj.created);
    set_opt(&mut node, "modified", &obj.modified);

    let identifier = attack_identifier(&obj.external_references);
    let version = obj.x_mitre_version.clone();

    match label {
        Label::Technique => {
            let identifier = identifier.unwrap_or_default();
            if !identifier.is_empty() {
                node.set("identifier", identifier);
            }
            let tactics: Vec<String> = dedup(obj.kill_chain_phases.iter().map(|p| p.phase_name.clone()));
            let phases: Vec<String> = obj
                .kill_chain_phases
                .iter()
                .filter(|p| !p.phase_name.is_empty())
                .map(|p| format!("{}: {}", p.kill_chain_name, p.phase_name))
                .collect();
            let data_sources: Vec<String> = obj
                .x_mitre_data_sources
                .iter()
                .filter_map(DataSourceEntry::name)
                .map(str::to_string)
                .collect();
            node.set("tactics", tactics);
            node.set("kill_chain_phases", phases);
            node.set("platforms", obj.x_mitre_platforms.clone());
            node.set("data_sources", data_sources);
            node.set("permissions_required", obj.x_mitre_permissions_required.clone());
            node.set("effective_permissions", obj.x_mitre_effective_permissions.clone());
            node.set("system_requirements", obj.x_mitre_system_requirements.clone());
            node.set("defense_bypassed", obj.x_mitre_defense_bypassed.clone());
            node.set("detection", obj.x_mitre_detection.clone().unwrap_or_default());
            node.set("is_subtechnique", identifier.contains('.'));
            node.set("version", version.unwrap_or_else(|| "1.0".to_string()));
        }
        Label::Tactic => {
            set_opt(&mut node, "short_name", &obj.x_mitre_shortname);
            set_opt(&mut node, "version", &version);
        }
        Label::Malware | Label::Tool => {
            node.set("labels", obj.labels.clone());
            node.set("aliases", obj.aliases.clone());
            node.set("platforms", obj.x_mitre_platforms.clone());
            set_opt(&mut node, "version", &version);
        }
        Label::ThreatGroup => {
            node.set("aliases", obj.aliases.clone());
            set_opt(&mut node, "version", &version);
        }
        Label::Mitigation => {
            set_opt(&mut node, "version", &version);
        }
        Label::DataSource => {
            node.set("platforms", obj.x_mitre_platforms.clone());
            node.set("collection_layers", obj.x_mitre_collection_layers.clone());
            set_opt(&mut node, "version", &version);
        }
        Label::DataComponent => {
            set_opt(&mut node, "version", &version);
        }
        Label::Campaign => {
            node.set("aliases", obj.aliases.clone());
            set_opt(&mut node, "first_seen", &obj.first_seen);
            set_opt(&mut node, "last_seen", &obj.last_seen);
            set_opt(&mut node, "version", &version);
        }
        _ => {}
    }

    if matches!(
        label,
        Label::Mitigation | Label::ThreatGroup | Label::Malware | Label::Tool | Label::Campaign
    ) {
        if let Some(id) = identifier {
            node.set("identifier", id);
        }
    }

    Some(node)
}

/// Emit one Tactic per kill-chain phase not already present, and a
/// `PART_OF_TACTIC` edge for every technique/phase pair.
fn synthesize_tactics(graph: &mut NormalizedGraph) {
    let mut seen: BTreeSet<String> = graph
        .nodes_with_label(Label::Tactic)
        .map(|n| n.key.clone())
        .collect();

    let memberships: Vec<(Endpoint, Vec<String>)> = graph
        .nodes_with_label(Label::Technique)
        .map(|t| {
            let phases = t.get_list("tactics").into_iter().map(str::to_string).collect();
            (Endpoint::new(Label::Technique, t.key.clone()), phases)
        })
        .collect();

    for (technique, phases) in memberships {
        for short in phases.iter().filter(|p| !p.is_empty()) {
            let key = tactic_key(short);
            if seen.insert(key.clone()) {
                let name = title_case(short);
                let description = format!("MITRE ATT&CK Tactic: {name}");
                let tactic = Node::new(Label::Tactic, key.clone())
                    .with_property("name", name.as_str())
                    .with_property("short_name", short.as_str())
                    .with_property("description_preview", truncate_chars(&description, PREVIEW_CHARS))
                    .with_property("description", description);
                graph.push_node(tactic);
            }
            graph.push_relationship(Relationship::new(
                RelType::PartOfTactic,
                technique.clone(),
                Endpoint::new(Label::Tactic, key),
            ));
        }
    }
}

/// `T1055` → `T1055.001` for every dotted identifier whose parent exists.
fn link_subtechniques(graph: &mut NormalizedGraph) {
    let parents: HashMap<String, String> = graph
        .nodes_with_label(Label::Technique)
        .filter_map(|n| n.identifier().map(|id| (id, n)))
        .filter(|(id, _)| !id.contains('.'))
        .map(|(id, n)| (id.to_string(), n.key.clone()))
        .collect();

    let links: Vec<Relationship> = graph
        .nodes_with_label(Label::Technique)
        .filter_map(|child| {
            let id = child.identifier()?;
            let (parent_id, _) = id.split_once('.')?;
            let parent_key = parents.get(parent_id)?;
            Some(Relationship::new(
                RelType::HasSubtechnique,
                Endpoint::new(Label::Technique, parent_key.clone()),
                Endpoint::new(Label::Technique, child.key.clone()),
            ))
        })
        .collect();

    for rel in links {
        graph.push_relationship(rel);
    }
}

pub(crate) fn tactic_key(short_name: &str) -> String {
    format!("tactic--{short_name}")
}

/// `privilege-escalation` → `Privilege Escalation`
fn title_case(short_name: &str) -> String {
    short_name
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn set_opt(node: &mut Node, key: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        node.set(key, PropertyValue::from(v));
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.filter(|s| !s.is_empty() && seen.insert(s.clone())).collect()
}
