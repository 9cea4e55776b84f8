//! Direct graph lookups: statistics, technique details and catalogs

use crate::framework::{Framework, FrameworkInfo};
use crate::graph::{Endpoint, Label, Node, RelType};
use crate::storage::{GraphStore, MatchFields, NodeFilter, StorageResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node and relationship counts for the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnowledgeBaseStats {
    pub labels: BTreeMap<Label, usize>,
    pub total_nodes: usize,
    pub relationships: usize,
}

impl KnowledgeBaseStats {
    pub fn count(&self, label: Label) -> usize {
        self.labels.get(&label).copied().unwrap_or(0)
    }
}

/// One technique listed under a tactic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TacticTechnique {
    pub tactic: String,
    pub identifier: String,
    pub name: String,
    pub description: String,
}

/// One technique a threat group is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTechnique {
    pub group_name: String,
    pub identifier: String,
    pub technique_name: String,
    pub description: String,
    pub relationship_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechniqueDetail {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub platforms: Vec<String>,
    pub tactics: Vec<String>,
    pub threat_groups: Vec<String>,
    pub malware: Vec<String>,
}

/// A row in one of the catalog listings. Absent attributes are skipped
/// when serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

impl CatalogEntry {
    fn from_node(node: &Node) -> Self {
        let owned = |key: &str| node.get_str(key).filter(|s| !s.is_empty()).map(str::to_string);
        let list = |key: &str| node.get_list(key).into_iter().map(str::to_string).collect();
        Self {
            name: display(node),
            identifier: node.identifier().map(str::to_string),
            description: owned("description"),
            aliases: list("aliases"),
            platforms: list("platforms"),
            first_seen: owned("first_seen"),
            last_seen: owned("last_seen"),
        }
    }
}

/// Framework metadata with its live node count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkSummary {
    #[serde(flatten)]
    pub info: FrameworkInfo,
    pub nodes: usize,
}

/// Read-only queries over the stored graph.
pub struct GraphQueries {
    store: Arc<dyn GraphStore>,
}

impl GraphQueries {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn stats(&self) -> StorageResult<KnowledgeBaseStats> {
        let mut stats = KnowledgeBaseStats::default();
        for label in Label::ALL {
            let n = self.store.count_nodes(Some(label))?;
            if n > 0 {
                stats.labels.insert(label, n);
            }
            stats.total_nodes += n;
        }
        stats.relationships = self.store.count_relationships()?;
        Ok(stats)
    }

    /// Techniques linked to a tactic by `PART_OF_TACTIC`.
    ///
    /// With a name (matched against the tactic name or short name,
    /// ignoring case), rows are ordered by technique identifier. Without one,
    /// every tactic is listed, ordered by tactic name and then identifier.
    pub fn techniques_by_tactic(&self, tactic: Option<&str>) -> StorageResult<Vec<TacticTechnique>> {
        let wanted = tactic.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
        let tactics = self.store.find_nodes(&NodeFilter::new().with_label(Label::Tactic))?;

        let mut rows = Vec::new();
        for tac in tactics.iter().filter(|t| match &wanted {
            None => true,
            Some(w) => {
                t.name().is_some_and(|n| n.to_lowercase() == *w)
                    || t.get_str("short_name").is_some_and(|s| s.to_lowercase() == *w)
            }
        }) {
            let endpoint = Endpoint::new(Label::Tactic, tac.key.clone());
            for rel in self.store.relationships_to(&endpoint)? {
                if !rel.rel_type.is(RelType::PartOfTactic) || rel.source.label != Label::Technique {
                    continue;
                }
                if let Some(technique) = self.store.get_node(Label::Technique, &rel.source.key)? {
                    rows.push(TacticTechnique {
                        tactic: display(tac),
                        identifier: technique.identifier().unwrap_or_default().to_string(),
                        name: display(&technique),
                        description: technique.description().unwrap_or_default().to_string(),
                    });
                }
            }
        }

        rows.sort_by(|a, b| a.tactic.cmp(&b.tactic).then_with(|| a.identifier.cmp(&b.identifier)));
        Ok(rows)
    }

    /// Techniques used by every threat group whose name contains `group_name`.
    pub fn threat_group_techniques(&self, group_name: &str) -> StorageResult<Vec<GroupTechnique>> {
        let filter = NodeFilter::new()
            .with_label(Label::ThreatGroup)
            .with_keywords([group_name.trim()])
            .with_fields(MatchFields {
                name: true,
                description: false,
                identifier: false,
                aliases: false,
            });

        let mut rows = Vec::new();
        for group in self.store.find_nodes(&filter)? {
            let endpoint = Endpoint::new(Label::ThreatGroup, group.key.clone());
            for rel in self.store.relationships_from(&endpoint)? {
                if rel.target.label != Label::Technique {
                    continue;
                }
                if let Some(technique) = self.store.get_node(Label::Technique, &rel.target.key)? {
                    rows.push(GroupTechnique {
                        group_name: display(&group),
                        identifier: technique.identifier().unwrap_or_default().to_string(),
                        technique_name: display(&technique),
                        description: technique.description().unwrap_or_default().to_string(),
                        relationship_type: rel.rel_type.to_string(),
                    });
                }
            }
        }

        rows.sort_by(|a, b| a.identifier.cmp(&b.identifier).then_with(|| a.group_name.cmp(&b.group_name)));
        Ok(rows)
    }

    /// The technique with this ATT&CK id (e.g. `T1055`, case-insensitive).
    pub fn technique_by_id(&self, id: &str) -> StorageResult<Option<TechniqueDetail>> {
        let Some(technique) = self.find_technique(id)? else {
            return Ok(None);
        };
        let endpoint = Endpoint::new(Label::Technique, technique.key.clone());

        let mut tactics = Vec::new();
        for rel in self.store.relationships_from(&endpoint)? {
            if rel.rel_type.is(RelType::PartOfTactic) {
                if let Some(tactic) = self.store.get_node(Label::Tactic, &rel.target.key)? {
                    tactics.push(display(&tactic));
                }
            }
        }

        let mut threat_groups = Vec::new();
        let mut malware = Vec::new();
        for rel in self.store.relationships_to(&endpoint)? {
            if !rel.rel_type.is(RelType::Uses) {
                continue;
            }
            let bucket = match rel.source.label {
                Label::ThreatGroup => &mut threat_groups,
                Label::Malware => &mut malware,
                _ => continue,
            };
            if let Some(node) = self.store.get_node(rel.source.label, &rel.source.key)? {
                bucket.push(display(&node));
            }
        }
        for names in [&mut tactics, &mut threat_groups, &mut malware] {
            names.sort();
            names.dedup();
        }

        Ok(Some(TechniqueDetail {
            identifier: technique.identifier().unwrap_or_default().to_string(),
            name: display(&technique),
            description: technique.description().unwrap_or_default().to_string(),
            platforms: technique.get_list("platforms").into_iter().map(str::to_string).collect(),
            tactics,
            threat_groups,
            malware,
        }))
    }

    /// Mitigations with a `MITIGATES` edge into the technique, by identifier.
    pub fn technique_mitigations(&self, id: &str) -> StorageResult<Vec<CatalogEntry>> {
        let Some(technique) = self.find_technique(id)? else {
            return Ok(Vec::new());
        };
        let endpoint = Endpoint::new(Label::Technique, technique.key.clone());

        let mut entries = Vec::new();
        for rel in self.store.relationships_to(&endpoint)? {
            if rel.rel_type.is(RelType::Mitigates) && rel.source.label == Label::Mitigation {
                if let Some(mitigation) = self.store.get_node(Label::Mitigation, &rel.source.key)? {
                    entries.push(CatalogEntry::from_node(&mitigation));
                }
            }
        }
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(entries)
    }

    pub fn list_tactics(&self) -> StorageResult<Vec<CatalogEntry>> {
        self.catalog(Label::Tactic, by_name)
    }

    pub fn list_threat_groups(&self) -> StorageResult<Vec<CatalogEntry>> {
        self.catalog(Label::ThreatGroup, by_name)
    }

    pub fn list_mitigations(&self) -> StorageResult<Vec<CatalogEntry>> {
        self.catalog(Label::Mitigation, |a, b| a.identifier.cmp(&b.identifier))
    }

    pub fn list_data_sources(&self) -> StorageResult<Vec<CatalogEntry>> {
        self.catalog(Label::DataSource, by_name)
    }

    pub fn list_campaigns(&self) -> StorageResult<Vec<CatalogEntry>> {
        self.catalog(Label::Campaign, by_name)
    }

    /// Every framework's metadata, with the number of nodes it owns.
    pub fn framework_info(&self) -> StorageResult<Vec<FrameworkSummary>> {
        Framework::ALL
            .iter()
            .map(|framework| {
                let mut nodes = 0;
                for label in framework.labels() {
                    nodes += self.store.count_nodes(Some(label))?;
                }
                Ok(FrameworkSummary {
                    info: framework.info(),
                    nodes,
                })
            })
            .collect()
    }

    fn find_technique(&self, id: &str) -> StorageResult<Option<Node>> {
        let filter = NodeFilter::new()
            .with_label(Label::Technique)
            .with_property("identifier", id.trim().to_uppercase())
            .with_limit(1);
        Ok(self.store.find_nodes(&filter)?.into_iter().next())
    }

    fn catalog(
        &self,
        label: Label,
        order: impl FnMut(&CatalogEntry, &CatalogEntry) -> std::cmp::Ordering,
    ) -> StorageResult<Vec<CatalogEntry>> {
        let mut entries: Vec<CatalogEntry> = self
            .store
            .find_nodes(&NodeFilter::new().with_label(label))?
            .iter()
            .map(CatalogEntry::from_node)
            .collect();
        entries.sort_by(order);
        Ok(entries)
    }
}

fn by_name(a: &CatalogEntry, b: &CatalogEntry) -> std::cmp::Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

fn display(node: &Node) -> String {
    node.name().unwrap_or(&node.key).to_string()
}
