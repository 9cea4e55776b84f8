//! Frameworks, retrieval scopes and their metadata
//!
//! ATT&CK arrives as STIX bundles; the five document frameworks arrive as
//! PDFs and are described by a [`FrameworkSchema`] that drives the generic
//! tree walker in `normalize::document`.

mod schema;

pub use schema::{CrossReference, DocumentCitation, FrameworkSchema, KeyMatch, LevelSchema, PdfProfile};

use crate::graph::Label;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    Attack,
    Cis,
    Nist,
    Hipaa,
    Ffiec,
    PciDss,
}

/// Descriptive metadata shown by `frameworks` listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
    pub source: &'static str,
}

impl Framework {
    pub const ALL: [Framework; 6] = [
        Framework::Attack,
        Framework::Cis,
        Framework::Nist,
        Framework::Hipaa,
        Framework::Ffiec,
        Framework::PciDss,
    ];

    /// Frameworks ingested from PDF documents.
    pub const DOCUMENTS: [Framework; 5] = [
        Framework::Cis,
        Framework::Nist,
        Framework::Hipaa,
        Framework::Ffiec,
        Framework::PciDss,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Framework::Attack => "ATT&CK",
            Framework::Cis => "CIS",
            Framework::Nist => "NIST",
            Framework::Hipaa => "HIPAA",
            Framework::Ffiec => "FFIEC",
            Framework::PciDss => "PCI_DSS",
        }
    }

    /// Command-line spelling.
    pub fn slug(&self) -> &'static str {
        match self {
            Framework::Attack => "attack",
            Framework::Cis => "cis",
            Framework::Nist => "nist",
            Framework::Hipaa => "hipaa",
            Framework::Ffiec => "ffiec",
            Framework::PciDss => "pci-dss",
        }
    }

    pub fn info(&self) -> FrameworkInfo {
        let (name, kind, source) = match self {
            Framework::Attack => ("MITRE ATT&CK", "Threat Intelligence", "MITRE Corporation"),
            Framework::Cis => ("CIS Controls v8.1", "Security Controls", "Center for Internet Security"),
            Framework::Nist => (
                "NIST Cybersecurity Framework 2.0",
                "Risk Management",
                "National Institute of Standards and Technology",
            ),
            Framework::Hipaa => (
                "HIPAA Administrative Simplification",
                "Regulatory Compliance",
                "U.S. Department of Health and Human Services",
            ),
            Framework::Ffiec => (
                "FFIEC IT Examination Handbook",
                "Regulatory Guidance",
                "Federal Financial Institutions Examination Council",
            ),
            Framework::PciDss => (
                "PCI Data Security Standard v4.0.1",
                "Industry Standard",
                "PCI Security Standards Council",
            ),
        };
        FrameworkInfo {
            code: self.code(),
            name,
            kind,
            source,
        }
    }

    /// Labels owned by this framework, in canonical order.
    pub fn labels(&self) -> Vec<Label> {
        Label::ALL
            .iter()
            .copied()
            .filter(|l| l.framework() == Some(*self))
            .collect()
    }

    /// Categories searched when the classifier gives nothing usable, and in
    /// "smart" mode when no classifier output survives filtering.
    pub fn default_labels(&self) -> Vec<Label> {
        match self {
            Framework::Attack => vec![Label::Technique, Label::Malware, Label::ThreatGroup],
            Framework::Cis => vec![Label::CisControl, Label::CisSafeguard],
            Framework::Nist => vec![Label::NistCategory, Label::NistSubcategory],
            Framework::Hipaa => vec![Label::HipaaSection, Label::HipaaRequirement],
            Framework::Ffiec => vec![Label::FfiecProcedure, Label::FfiecExaminationStep],
            Framework::PciDss => vec![Label::PciDssRequirement, Label::PciDssSubRequirement],
        }
    }

    /// Document schema; `None` for ATT&CK, which is STIX-sourced.
    pub fn schema(&self) -> Option<&'static FrameworkSchema> {
        match self {
            Framework::Attack => None,
            Framework::Cis => Some(&schema::CIS),
            Framework::Nist => Some(&schema::NIST),
            Framework::Hipaa => Some(&schema::HIPAA),
            Framework::Ffiec => Some(&schema::FFIEC),
            Framework::PciDss => Some(&schema::PCI_DSS),
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown framework: {0}")]
pub struct UnknownFramework(pub String);

impl FromStr for Framework {
    type Err = UnknownFramework;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "attack" | "att&ck" | "mitre" | "mitre-att&ck" | "mitre-attack" => Ok(Framework::Attack),
            "cis" | "cis-controls" => Ok(Framework::Cis),
            "nist" | "nist-csf" => Ok(Framework::Nist),
            "hipaa" => Ok(Framework::Hipaa),
            "ffiec" => Ok(Framework::Ffiec),
            "pci-dss" | "pci" | "pcidss" => Ok(Framework::PciDss),
            _ => Err(UnknownFramework(s.to_string())),
        }
    }
}

/// Retrieval scope: every framework, or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    All,
    Only(Framework),
}

impl Scope {
    /// Labels a retrieval in this scope may touch, in canonical order.
    pub fn allowed_labels(&self) -> Vec<Label> {
        match self {
            Scope::All => Label::ALL
                .iter()
                .copied()
                .filter(|l| l.category().is_some())
                .collect(),
            Scope::Only(framework) => framework.labels(),
        }
    }

    pub fn default_labels(&self) -> Vec<Label> {
        match self {
            Scope::All => vec![
                Label::Technique,
                Label::Mitigation,
                Label::CisSafeguard,
                Label::NistSubcategory,
            ],
            Scope::Only(framework) => framework.default_labels(),
        }
    }

    pub fn allows(&self, label: Label) -> bool {
        label.category().is_some()
            && match self {
                Scope::All => true,
                Scope::Only(framework) => label.framework() == Some(*framework),
            }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("All Frameworks"),
            Scope::Only(framework) => f.write_str(framework.info().name),
        }
    }
}

impl FromStr for Scope {
    type Err = UnknownFramework;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "all frameworks" | "all-frameworks" | "" => Ok(Scope::All),
            other => other.parse().map(Scope::Only),
        }
    }
}
