//! Relationships between nodes

use super::label::Label;
use super::node::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed relationship vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    // STIX relationship types
    Uses,
    Mitigates,
    AttributedTo,
    Targets,
    Delivers,
    CommunicatesWith,
    Controls,
    Leverages,
    Exploits,
    Compromises,
    // Synthesized during normalization
    PartOfTactic,
    HasSubtechnique,
    BelongsToDataSource,
    // Document hierarchy
    HasSafeguard,
    HasCategory,
    HasSubcategory,
    HasSection,
    HasRequirement,
    HasSubRequirement,
    HasTestingProcedure,
    HasProcedure,
    HasStep,
    HasCitation,
    // Cross-framework
    Implements,
    Supports,
}

impl RelType {
    const ALL: [RelType; 25] = [
        RelType::Uses,
        RelType::Mitigates,
        RelType::AttributedTo,
        RelType::Targets,
        RelType::Delivers,
        RelType::CommunicatesWith,
        RelType::Controls,
        RelType::Leverages,
        RelType::Exploits,
        RelType::Compromises,
        RelType::PartOfTactic,
        RelType::HasSubtechnique,
        RelType::BelongsToDataSource,
        RelType::HasSafeguard,
        RelType::HasCategory,
        RelType::HasSubcategory,
        RelType::HasSection,
        RelType::HasRequirement,
        RelType::HasSubRequirement,
        RelType::HasTestingProcedure,
        RelType::HasProcedure,
        RelType::HasStep,
        RelType::HasCitation,
        RelType::Implements,
        RelType::Supports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::Uses => "USES",
            RelType::Mitigates => "MITIGATES",
            RelType::AttributedTo => "ATTRIBUTED_TO",
            RelType::Targets => "TARGETS",
            RelType::Delivers => "DELIVERS",
            RelType::CommunicatesWith => "COMMUNICATES_WITH",
            RelType::Controls => "CONTROLS",
            RelType::Leverages => "LEVERAGES",
            RelType::Exploits => "EXPLOITS",
            RelType::Compromises => "COMPROMISES",
            RelType::PartOfTactic => "PART_OF_TACTIC",
            RelType::HasSubtechnique => "HAS_SUBTECHNIQUE",
            RelType::BelongsToDataSource => "BELONGS_TO_DATA_SOURCE",
            RelType::HasSafeguard => "HAS_SAFEGUARD",
            RelType::HasCategory => "HAS_CATEGORY",
            RelType::HasSubcategory => "HAS_SUBCATEGORY",
            RelType::HasSection => "HAS_SECTION",
            RelType::HasRequirement => "HAS_REQUIREMENT",
            RelType::HasSubRequirement => "HAS_SUB_REQUIREMENT",
            RelType::HasTestingProcedure => "HAS_TESTING_PROCEDURE",
            RelType::HasProcedure => "HAS_PROCEDURE",
            RelType::HasStep => "HAS_STEP",
            RelType::HasCitation => "HAS_CITATION",
            RelType::Implements => "IMPLEMENTS",
            RelType::Supports => "SUPPORTS",
        }
    }

    /// Look up a STIX `relationship_type` (kebab-case) in the STIX subset
    /// of the vocabulary.
    pub fn from_stix(relationship_type: &str) -> Option<RelType> {
        match relationship_type {
            "uses" => Some(RelType::Uses),
            "mitigates" => Some(RelType::Mitigates),
            "attributed-to" => Some(RelType::AttributedTo),
            "targets" => Some(RelType::Targets),
            "delivers" => Some(RelType::Delivers),
            "communicates-with" => Some(RelType::CommunicatesWith),
            "controls" => Some(RelType::Controls),
            "leverages" => Some(RelType::Leverages),
            "exploits" => Some(RelType::Exploits),
            "compromises" => Some(RelType::Compromises),
            _ => None,
        }
    }

    /// Parse a stored upper-snake-case name.
    pub fn parse(name: &str) -> Option<RelType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship type: a known vocabulary entry, or an unrecognized STIX
/// name kept verbatim (upper-cased, dashes replaced by underscores).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    Known(RelType),
    Verbatim(String),
}

impl RelationshipType {
    pub fn from_stix(relationship_type: &str) -> Self {
        match RelType::from_stix(relationship_type) {
            Some(known) => RelationshipType::Known(known),
            None => RelationshipType::Verbatim(relationship_type.to_uppercase().replace('-', "_")),
        }
    }

    /// Rebuild from the stored string form.
    pub fn from_stored(name: &str) -> Self {
        match RelType::parse(name) {
            Some(known) => RelationshipType::Known(known),
            None => RelationshipType::Verbatim(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RelationshipType::Known(t) => t.as_str(),
            RelationshipType::Verbatim(s) => s,
        }
    }

    pub fn is(&self, rel: RelType) -> bool {
        matches!(self, RelationshipType::Known(t) if *t == rel)
    }
}

impl From<RelType> for RelationshipType {
    fn from(t: RelType) -> Self {
        RelationshipType::Known(t)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a relationship, addressed by `(label, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub label: Label,
    pub key: String,
}

impl Endpoint {
    pub fn new(label: Label, key: impl Into<String>) -> Self {
        Self { label, key: key.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.label, self.key)
    }
}

/// A directed relationship, unique per `(type, source, target)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub rel_type: RelationshipType,
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(rel_type: impl Into<RelationshipType>, source: Endpoint, target: Endpoint) -> Self {
        Self {
            rel_type: rel_type.into(),
            source,
            target,
            properties: Properties::new(),
        }
    }

    /// Builder: set a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_stix_types_map_into_vocabulary() {
        assert_eq!(
            RelationshipType::from_stix("mitigates"),
            RelationshipType::Known(RelType::Mitigates)
        );
        assert_eq!(
            RelationshipType::from_stix("attributed-to").as_str(),
            "ATTRIBUTED_TO"
        );
    }

    #[test]
    fn unknown_stix_types_are_kept_verbatim() {
        let rel = RelationshipType::from_stix("revoked-by");
        assert_eq!(rel, RelationshipType::Verbatim("REVOKED_BY".into()));
        assert!(!rel.is(RelType::Uses));
    }

    #[test]
    fn stored_names_restore_known_variants() {
        assert!(RelationshipType::from_stored("PART_OF_TACTIC").is(RelType::PartOfTactic));
        assert_eq!(
            RelationshipType::from_stored("DETECTS"),
            RelationshipType::Verbatim("DETECTS".into())
        );
    }
}
