//! Node labels and the STIX type lookup table

use crate::framework::Framework;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of node labels across every framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    // ATT&CK
    Technique,
    Tactic,
    Malware,
    ThreatGroup,
    Tool,
    Mitigation,
    DataSource,
    DataComponent,
    Campaign,
    // CIS Controls
    #[serde(rename = "CIS_Control")]
    CisControl,
    #[serde(rename = "CIS_Safeguard")]
    CisSafeguard,
    // NIST CSF
    #[serde(rename = "NIST_Function")]
    NistFunction,
    #[serde(rename = "NIST_Category")]
    NistCategory,
    #[serde(rename = "NIST_Subcategory")]
    NistSubcategory,
    // HIPAA
    #[serde(rename = "HIPAA_Regulation")]
    HipaaRegulation,
    #[serde(rename = "HIPAA_Section")]
    HipaaSection,
    #[serde(rename = "HIPAA_Requirement")]
    HipaaRequirement,
    // FFIEC
    #[serde(rename = "FFIEC_Section")]
    FfiecSection,
    #[serde(rename = "FFIEC_Procedure")]
    FfiecProcedure,
    #[serde(rename = "FFIEC_ExaminationStep")]
    FfiecExaminationStep,
    // PCI DSS
    #[serde(rename = "PCI_DSS_Requirement")]
    PciDssRequirement,
    #[serde(rename = "PCI_DSS_SubRequirement")]
    PciDssSubRequirement,
    #[serde(rename = "PCI_DSS_TestingProcedure")]
    PciDssTestingProcedure,
    /// Document-level provenance node, one per ingested framework document.
    Citation,
}

impl Label {
    pub const ALL: [Label; 24] = [
        Label::Technique,
        Label::Tactic,
        Label::Malware,
        Label::ThreatGroup,
        Label::Tool,
        Label::Mitigation,
        Label::DataSource,
        Label::DataComponent,
        Label::Campaign,
        Label::CisControl,
        Label::CisSafeguard,
        Label::NistFunction,
        Label::NistCategory,
        Label::NistSubcategory,
        Label::HipaaRegulation,
        Label::HipaaSection,
        Label::HipaaRequirement,
        Label::FfiecSection,
        Label::FfiecProcedure,
        Label::FfiecExaminationStep,
        Label::PciDssRequirement,
        Label::PciDssSubRequirement,
        Label::PciDssTestingProcedure,
        Label::Citation,
    ];

    /// Label name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Technique => "Technique",
            Label::Tactic => "Tactic",
            Label::Malware => "Malware",
            Label::ThreatGroup => "ThreatGroup",
            Label::Tool => "Tool",
            Label::Mitigation => "Mitigation",
            Label::DataSource => "DataSource",
            Label::DataComponent => "DataComponent",
            Label::Campaign => "Campaign",
            Label::CisControl => "CIS_Control",
            Label::CisSafeguard => "CIS_Safeguard",
            Label::NistFunction => "NIST_Function",
            Label::NistCategory => "NIST_Category",
            Label::NistSubcategory => "NIST_Subcategory",
            Label::HipaaRegulation => "HIPAA_Regulation",
            Label::HipaaSection => "HIPAA_Section",
            Label::HipaaRequirement => "HIPAA_Requirement",
            Label::FfiecSection => "FFIEC_Section",
            Label::FfiecProcedure => "FFIEC_Procedure",
            Label::FfiecExaminationStep => "FFIEC_ExaminationStep",
            Label::PciDssRequirement => "PCI_DSS_Requirement",
            Label::PciDssSubRequirement => "PCI_DSS_SubRequirement",
            Label::PciDssTestingProcedure => "PCI_DSS_TestingProcedure",
            Label::Citation => "Citation",
        }
    }

    /// Human-readable singular name used when rendering matches.
    pub fn display_name(&self) -> &'static str {
        match self {
            Label::Technique => "Technique",
            Label::Tactic => "Tactic",
            Label::Malware => "Malware",
            Label::ThreatGroup => "Threat Group",
            Label::Tool => "Tool",
            Label::Mitigation => "Mitigation",
            Label::DataSource => "Data Source",
            Label::DataComponent => "Data Component",
            Label::Campaign => "Campaign",
            Label::CisControl => "CIS Control",
            Label::CisSafeguard => "CIS Safeguard",
            Label::NistFunction => "NIST Function",
            Label::NistCategory => "NIST Category",
            Label::NistSubcategory => "NIST Subcategory",
            Label::HipaaRegulation => "HIPAA Regulation",
            Label::HipaaSection => "HIPAA Section",
            Label::HipaaRequirement => "HIPAA Requirement",
            Label::FfiecSection => "FFIEC Section",
            Label::FfiecProcedure => "FFIEC Procedure",
            Label::FfiecExaminationStep => "FFIEC Examination Step",
            Label::PciDssRequirement => "PCI DSS Requirement",
            Label::PciDssSubRequirement => "PCI DSS Sub-Requirement",
            Label::PciDssTestingProcedure => "PCI DSS Testing Procedure",
            Label::Citation => "Citation",
        }
    }

    /// Retrieval category name (what the intent classifier speaks).
    ///
    /// `Citation` has no category; it is never searched directly.
    pub fn category(&self) -> Option<&'static str> {
        let name = match self {
            Label::Technique => "techniques",
            Label::Tactic => "tactics",
            Label::Malware => "malware",
            Label::ThreatGroup => "threat_groups",
            Label::Tool => "tools",
            Label::Mitigation => "mitigations",
            Label::DataSource => "data_sources",
            Label::DataComponent => "data_components",
            Label::Campaign => "campaigns",
            Label::CisControl => "cis_controls",
            Label::CisSafeguard => "cis_safeguards",
            Label::NistFunction => "nist_functions",
            Label::NistCategory => "nist_categories",
            Label::NistSubcategory => "nist_subcategories",
            Label::HipaaRegulation => "hipaa_regulations",
            Label::HipaaSection => "hipaa_sections",
            Label::HipaaRequirement => "hipaa_requirements",
            Label::FfiecSection => "ffiec_sections",
            Label::FfiecProcedure => "ffiec_procedures",
            Label::FfiecExaminationStep => "ffiec_steps",
            Label::PciDssRequirement => "pci_requirements",
            Label::PciDssSubRequirement => "pci_sub_requirements",
            Label::PciDssTestingProcedure => "pci_testing_procedures",
            Label::Citation => return None,
        };
        Some(name)
    }

    /// Inverse of [`Label::category`], case-insensitive.
    pub fn from_category(category: &str) -> Option<Label> {
        let wanted = category.trim().to_lowercase();
        Label::ALL
            .iter()
            .copied()
            .find(|l| l.category() == Some(wanted.as_str()))
    }

    /// Block header used by the retriever, e.g. `ATT&CK TECHNIQUES`.
    pub fn section_heading(&self) -> &'static str {
        match self {
            Label::Technique => "ATT&CK TECHNIQUES",
            Label::Tactic => "ATT&CK TACTICS",
            Label::Malware => "MALWARE",
            Label::ThreatGroup => "THREAT GROUPS",
            Label::Tool => "TOOLS",
            Label::Mitigation => "MITIGATIONS",
            Label::DataSource => "DATA SOURCES",
            Label::DataComponent => "DATA COMPONENTS",
            Label::Campaign => "CAMPAIGNS",
            Label::CisControl => "CIS CONTROLS",
            Label::CisSafeguard => "CIS SAFEGUARDS",
            Label::NistFunction => "NIST CSF FUNCTIONS",
            Label::NistCategory => "NIST CSF CATEGORIES",
            Label::NistSubcategory => "NIST CSF SUBCATEGORIES",
            Label::HipaaRegulation => "HIPAA REGULATIONS",
            Label::HipaaSection => "HIPAA SECTIONS",
            Label::HipaaRequirement => "HIPAA REQUIREMENTS",
            Label::FfiecSection => "FFIEC SECTIONS",
            Label::FfiecProcedure => "FFIEC EXAMINATION PROCEDURES",
            Label::FfiecExaminationStep => "FFIEC EXAMINATION STEPS",
            Label::PciDssRequirement => "PCI DSS REQUIREMENTS",
            Label::PciDssSubRequirement => "PCI DSS SUB-REQUIREMENTS",
            Label::PciDssTestingProcedure => "PCI DSS TESTING PROCEDURES",
            Label::Citation => "CITATIONS",
        }
    }

    /// Owning framework; `None` for the shared `Citation` label.
    pub fn framework(&self) -> Option<Framework> {
        match self {
            Label::Technique
            | Label::Tactic
            | Label::Malware
            | Label::ThreatGroup
            | Label::Tool
            | Label::Mitigation
            | Label::DataSource
            | Label::DataComponent
            | Label::Campaign => Some(Framework::Attack),
            Label::CisControl | Label::CisSafeguard => Some(Framework::Cis),
            Label::NistFunction | Label::NistCategory | Label::NistSubcategory => {
                Some(Framework::Nist)
            }
            Label::HipaaRegulation | Label::HipaaSection | Label::HipaaRequirement => {
                Some(Framework::Hipaa)
            }
            Label::FfiecSection | Label::FfiecProcedure | Label::FfiecExaminationStep => {
                Some(Framework::Ffiec)
            }
            Label::PciDssRequirement | Label::PciDssSubRequirement | Label::PciDssTestingProcedure => {
                Some(Framework::PciDss)
            }
            Label::Citation => None,
        }
    }

    /// Labels whose alias lists take part in keyword matching.
    pub fn has_aliases(&self) -> bool {
        matches!(self, Label::ThreatGroup | Label::Campaign)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored label string is not part of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// Map a STIX object `type` to its node label.
///
/// Unknown types return `None`; callers skip those objects and count them
/// as "other".
pub fn map_type(source_type: &str) -> Option<Label> {
    match source_type {
        "attack-pattern" => Some(Label::Technique),
        "malware" => Some(Label::Malware),
        "intrusion-set" => Some(Label::ThreatGroup),
        "tool" => Some(Label::Tool),
        "course-of-action" => Some(Label::Mitigation),
        "x-mitre-tactic" => Some(Label::Tactic),
        "x-mitre-data-source" => Some(Label::DataSource),
        "x-mitre-data-component" => Some(Label::DataComponent),
        "campaign" => Some(Label::Campaign),
        _ => None,
    }
}
