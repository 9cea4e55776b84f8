//! Per-framework document descriptors
//!
//! Each document framework is a fixed-depth tree (Control→Safeguard,
//! Function→Category→Subcategory, ...). A descriptor names, per level, the
//! label to emit, the JSON collection holding the entries, which fields to
//! copy and which containment relationship links it to the next level.

use crate::graph::{Label, RelType};
use serde_json::Value;

/// One tree level.
#[derive(Debug)]
pub struct LevelSchema {
    pub label: Label,
    /// Key of the array holding this level's entries inside the parent entry
    /// (or the document root for the top level).
    pub collection: &'static str,
    /// Field used as the display name, if the level has one.
    pub name_field: Option<&'static str>,
    /// Fields copied verbatim onto the node.
    pub fields: &'static [&'static str],
    /// Containment relationship from this level to the next.
    pub child_rel: Option<RelType>,
}

/// Page filtering and size limits for PDF text extraction.
#[derive(Debug)]
pub struct PdfProfile {
    pub file_name: &'static str,
    pub max_pages: usize,
    pub page_keywords: &'static [&'static str],
    pub max_chars: usize,
}

/// The document-level citation record.
#[derive(Debug)]
pub struct DocumentCitation {
    pub reference_name: &'static str,
    pub text: &'static str,
    pub url: &'static str,
    pub publication_date: &'static str,
    pub source_type: &'static str,
}

/// How a cross-reference selects nodes on its own side.
#[derive(Debug)]
pub enum KeyMatch {
    Exact(&'static [&'static str]),
    Prefix(&'static str),
}

impl KeyMatch {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatch::Exact(keys) => keys.contains(&key),
            KeyMatch::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

/// Illustrative link from a document node to ATT&CK mitigations.
#[derive(Debug)]
pub struct CrossReference {
    pub label: Label,
    pub keys: KeyMatch,
    pub rel: RelType,
    pub mitigation_ids: &'static [&'static str],
}

#[derive(Debug)]
pub struct FrameworkSchema {
    pub title: &'static str,
    /// Value of the `source` attribute on every emitted node.
    pub source: &'static str,
    pub pdf: PdfProfile,
    pub citation: DocumentCitation,
    pub levels: &'static [LevelSchema],
    /// JSON skeleton shown to the extraction model.
    pub prompt_shape: &'static str,
    pub prompt_focus: &'static str,
    pub cross_references: &'static [CrossReference],
    sample: &'static str,
}

impl FrameworkSchema {
    /// Top-level collection key (`controls`, `functions`, ...).
    pub fn root_collection(&self) -> &'static str {
        self.levels[0].collection
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.levels.iter().map(|l| l.label)
    }

    /// Hand-authored fallback tree, always well-formed.
    pub fn sample_tree(&self) -> Value {
        serde_json::from_str(self.sample).unwrap_or(Value::Null)
    }

    /// Structured-extraction prompt for a chunk of PDF text.
    pub fn extraction_prompt(&self, pdf_text: &str) -> String {
        format!(
            "Extract {title} information from the following PDF text. Return a JSON structure with:\n\n\
             {shape}\n\n\
             {focus}\n\n\
             Respond with JSON only.\n\n\
             PDF Text:\n{pdf_text}",
            title = self.title,
            shape = self.prompt_shape,
            focus = self.prompt_focus,
        )
    }
}

pub static CIS: FrameworkSchema = FrameworkSchema {
    title: "CIS Controls",
    source: "CIS Controls v8.1",
    pdf: PdfProfile {
        file_name: "CIS_Controls__v8.1_Guide__2024_06.pdf",
        max_pages: 100,
        page_keywords: &["control", "safeguard", "implementation"],
        max_chars: 50_000,
    },
    citation: DocumentCitation {
        reference_name: "CIS_Controls_v8.1",
        text: "Center for Internet Security (CIS) Controls Version 8.1",
        url: "https://www.cisecurity.org/controls",
        publication_date: "2024-06",
        source_type: "Official Framework",
    },
    levels: &[
        LevelSchema {
            label: Label::CisControl,
            collection: "controls",
            name_field: Some("name"),
            fields: &["name", "description"],
            child_rel: Some(RelType::HasSafeguard),
        },
        LevelSchema {
            label: Label::CisSafeguard,
            collection: "safeguards",
            name_field: None,
            fields: &["description", "asset_type", "security_function", "implementation_groups"],
            child_rel: None,
        },
    ],
    prompt_shape: r#"{
    "version": "version number",
    "publication_date": "date",
    "document_title": "title",
    "controls": [
        {
            "id": "CIS-X",
            "name": "Control Name",
            "description": "Description",
            "safeguards": [
                {
                    "id": "X.Y",
                    "description": "Safeguard description",
                    "asset_type": "Asset type (Devices/Applications/Data/etc)",
                    "security_function": "Function (Identify/Protect/Detect/Respond/Recover)",
                    "implementation_groups": ["IG1", "IG2", "IG3"]
                }
            ]
        }
    ]
}"#,
    prompt_focus: "Extract ALL available controls and safeguards from the text. Focus on control IDs \
                   (CIS-1, CIS-2, etc.), safeguard IDs (1.1, 1.2, 2.1, etc.), implementation groups \
                   (IG1, IG2, IG3), asset types and security functions.",
    cross_references: &[CrossReference {
        label: Label::CisSafeguard,
        keys: KeyMatch::Exact(&["1.1", "2.1"]),
        rel: RelType::Implements,
        mitigation_ids: &["M1013", "M1016"],
    }],
    sample: include_str!("../../data/samples/cis.json"),
};

pub static NIST: FrameworkSchema = FrameworkSchema {
    title: "NIST Cybersecurity Framework",
    source: "NIST CSF 2.0",
    pdf: PdfProfile {
        file_name: "NIST.CSWP.29.pdf",
        max_pages: 150,
        page_keywords: &[
            "function",
            "category",
            "subcategory",
            "govern",
            "identify",
            "protect",
            "detect",
            "respond",
            "recover",
        ],
        max_chars: 60_000,
    },
    citation: DocumentCitation {
        reference_name: "NIST_CSF_2.0",
        text: "NIST Cybersecurity Framework Version 2.0",
        url: "https://doi.org/10.6028/NIST.CSWP.29",
        publication_date: "2024-02",
        source_type: "Official Framework",
    },
    levels: &[
        LevelSchema {
            label: Label::NistFunction,
            collection: "functions",
            name_field: Some("name"),
            fields: &["name", "description"],
            child_rel: Some(RelType::HasCategory),
        },
        LevelSchema {
            label: Label::NistCategory,
            collection: "categories",
            name_field: Some("name"),
            fields: &["name", "description"],
            child_rel: Some(RelType::HasSubcategory),
        },
        LevelSchema {
            label: Label::NistSubcategory,
            collection: "subcategories",
            name_field: None,
            fields: &["description"],
            child_rel: None,
        },
    ],
    prompt_shape: r#"{
    "version": "version number (e.g., 2.0)",
    "publication_date": "date",
    "document_title": "title",
    "functions": [
        {
            "id": "Function ID (GV, ID, PR, DE, RS, RC)",
            "name": "Function Name",
            "description": "Function description",
            "categories": [
                {
                    "id": "Category ID (e.g., GV.OC, ID.AM)",
                    "name": "Category Name",
                    "description": "Category description",
                    "subcategories": [
                        {
                            "id": "Subcategory ID (e.g., GV.OC-01)",
                            "description": "Subcategory description"
                        }
                    ]
                }
            ]
        }
    ]
}"#,
    prompt_focus: "Extract ALL available Functions, Categories, and Subcategories. The main functions \
                   are GV (Govern), ID (Identify), PR (Protect), DE (Detect), RS (Respond) and RC \
                   (Recover). Keep complete subcategory descriptions and the hierarchy intact.",
    cross_references: &[CrossReference {
        label: Label::NistSubcategory,
        keys: KeyMatch::Prefix("PR.AC"),
        rel: RelType::Supports,
        mitigation_ids: &["M1026", "M1018"],
    }],
    sample: include_str!("../../data/samples/nist.json"),
};

pub static HIPAA: FrameworkSchema = FrameworkSchema {
    title: "HIPAA Administrative Simplification",
    source: "HIPAA Administrative Simplification",
    pdf: PdfProfile {
        file_name: "hipaa-simplification-201303.pdf",
        max_pages: 100,
        page_keywords: &["security", "privacy", "administrative", "rule", "section", "cfr"],
        max_chars: 55_000,
    },
    citation: DocumentCitation {
        reference_name: "HIPAA_Administrative_Simplification",
        text: "HIPAA Administrative Simplification Regulation Text",
        url: "https://www.hhs.gov/hipaa/for-professionals/security/index.html",
        publication_date: "2013-03",
        source_type: "Federal Regulation",
    },
    levels: &[
        LevelSchema {
            label: Label::HipaaRegulation,
            collection: "regulations",
            name_field: Some("title"),
            fields: &["title", "description", "cfr_reference"],
            child_rel: Some(RelType::HasSection),
        },
        LevelSchema {
            label: Label::HipaaSection,
            collection: "sections",
            name_field: Some("title"),
            fields: &["title", "description"],
            child_rel: Some(RelType::HasRequirement),
        },
        LevelSchema {
            label: Label::HipaaRequirement,
            collection: "requirements",
            name_field: None,
            fields: &["description", "entity_type", "information_type"],
            child_rel: None,
        },
    ],
    prompt_shape: r#"{
    "document_title": "title",
    "publication_date": "date",
    "regulations": [
        {
            "id": "Regulation ID (e.g., SECURITY-RULE)",
            "title": "Regulation title",
            "description": "Regulation description",
            "cfr_reference": "CFR citation (e.g., 45 CFR Part 164)",
            "sections": [
                {
                    "id": "Section number (e.g., 164.306)",
                    "title": "Section title",
                    "description": "Section description",
                    "requirements": [
                        {
                            "id": "Requirement ID (e.g., 164.306-a-1)",
                            "description": "Requirement text",
                            "entity_type": "Covered entity type",
                            "information_type": "Information type (e.g., ePHI)"
                        }
                    ]
                }
            ]
        }
    ]
}"#,
    prompt_focus: "Extract ALL available regulations, sections and requirements. Focus on the \
                   Security Rule and Privacy Rule, CFR references, and which entities and \
                   information types each requirement applies to.",
    cross_references: &[],
    sample: include_str!("../../data/samples/hipaa.json"),
};

pub static FFIEC: FrameworkSchema = FrameworkSchema {
    title: "FFIEC IT Examination Handbook (Information Security)",
    source: "FFIEC IT Handbook",
    pdf: PdfProfile {
        file_name: "2016- it-handbook-information-security-booklet.pdf",
        max_pages: 150,
        page_keywords: &["examination", "procedure", "control", "risk", "security", "information"],
        max_chars: 55_000,
    },
    citation: DocumentCitation {
        reference_name: "FFIEC_IT_Handbook_Information_Security",
        text: "FFIEC IT Examination Handbook Information Security Booklet",
        url: "https://ithandbook.ffiec.gov/it-booklets/information-security.aspx",
        publication_date: "2016",
        source_type: "Examination Handbook",
    },
    levels: &[
        LevelSchema {
            label: Label::FfiecSection,
            collection: "sections",
            name_field: Some("title"),
            fields: &["title", "description"],
            child_rel: Some(RelType::HasProcedure),
        },
        LevelSchema {
            label: Label::FfiecProcedure,
            collection: "examination_procedures",
            name_field: Some("title"),
            fields: &["title", "description"],
            child_rel: Some(RelType::HasStep),
        },
        LevelSchema {
            label: Label::FfiecExaminationStep,
            collection: "examination_steps",
            name_field: None,
            fields: &["description", "risk_area", "control_objective"],
            child_rel: None,
        },
    ],
    prompt_shape: r#"{
    "document_title": "title",
    "publication_year": "year",
    "sections": [
        {
            "id": "Section ID (e.g., GOVERNANCE-RISK-MGMT)",
            "title": "Section title",
            "description": "Section description",
            "examination_procedures": [
                {
                    "id": "Procedure ID (e.g., PROC-GOV-001)",
                    "title": "Procedure title",
                    "description": "Procedure description",
                    "examination_steps": [
                        {
                            "id": "Step ID (e.g., STEP-GOV-001-1)",
                            "description": "Examination step",
                            "risk_area": "Risk area",
                            "control_objective": "Control objective"
                        }
                    ]
                }
            ]
        }
    ]
}"#,
    prompt_focus: "Extract ALL available sections, examination procedures and examination steps. \
                   Focus on governance, access controls, incident response, network security and \
                   vendor management, with the risk area and control objective of every step.",
    cross_references: &[],
    sample: include_str!("../../data/samples/ffiec.json"),
};

pub static PCI_DSS: FrameworkSchema = FrameworkSchema {
    title: "PCI DSS",
    source: "PCI DSS v4.0.1",
    pdf: PdfProfile {
        file_name: "PCI-DSS-v4_0_1.pdf",
        max_pages: 200,
        page_keywords: &[
            "requirement",
            "testing",
            "procedure",
            "guidance",
            "firewall",
            "encryption",
            "access",
        ],
        max_chars: 55_000,
    },
    citation: DocumentCitation {
        reference_name: "PCI_DSS_v4_0_1",
        text: "Payment Card Industry Data Security Standard v4.0.1",
        url: "https://www.pcisecuritystandards.org/document_library/",
        publication_date: "2022-12",
        source_type: "Industry Standard",
    },
    levels: &[
        LevelSchema {
            label: Label::PciDssRequirement,
            collection: "requirements",
            name_field: Some("title"),
            fields: &["title", "description"],
            child_rel: Some(RelType::HasSubRequirement),
        },
        LevelSchema {
            label: Label::PciDssSubRequirement,
            collection: "sub_requirements",
            name_field: None,
            fields: &["description"],
            child_rel: Some(RelType::HasTestingProcedure),
        },
        LevelSchema {
            label: Label::PciDssTestingProcedure,
            collection: "testing_procedures",
            name_field: None,
            fields: &["description", "guidance"],
            child_rel: None,
        },
    ],
    prompt_shape: r#"{
    "document_title": "title",
    "publication_date": "date",
    "requirements": [
        {
            "id": "Requirement ID (e.g., REQ-1)",
            "title": "Requirement title",
            "description": "Requirement description",
            "sub_requirements": [
                {
                    "id": "Sub-requirement ID (e.g., REQ-1.1)",
                    "description": "Sub-requirement description",
                    "testing_procedures": [
                        {
                            "id": "Testing procedure ID (e.g., TEST-1.1.1)",
                            "description": "Testing procedure",
                            "guidance": "Guidance text"
                        }
                    ]
                }
            ]
        }
    ]
}"#,
    prompt_focus: "Extract ALL available requirements, sub-requirements and testing procedures, \
                   including the guidance attached to each testing procedure.",
    cross_references: &[],
    sample: include_str!("../../data/samples/pci_dss.json"),
};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&FrameworkSchema; 5] = [&CIS, &NIST, &HIPAA, &FFIEC, &PCI_DSS];

    #[test]
    fn sample_trees_parse_and_are_non_empty() {
        for schema in ALL {
            let tree = schema.sample_tree();
            let top = tree[schema.root_collection()].as_array();
            assert!(
                top.is_some_and(|entries| !entries.is_empty()),
                "{} sample has no {}",
                schema.title,
                schema.root_collection()
            );
        }
    }

    #[test]
    fn only_the_last_level_lacks_a_child_relationship() {
        for schema in ALL {
            let (last, rest) = schema.levels.split_last().unwrap();
            assert!(last.child_rel.is_none());
            assert!(rest.iter().all(|l| l.child_rel.is_some()));
        }
    }

    #[test]
    fn cross_reference_matching() {
        assert!(KeyMatch::Exact(&["1.1", "2.1"]).matches("2.1"));
        assert!(!KeyMatch::Exact(&["1.1", "2.1"]).matches("1.10"));
        assert!(KeyMatch::Prefix("PR.AC").matches("PR.AC-01"));
    }

    #[test]
    fn extraction_prompt_embeds_text_and_shape() {
        let prompt = NIST.extraction_prompt("GV.OC-01 text");
        assert!(prompt.contains("\"subcategories\""));
        assert!(prompt.ends_with("GV.OC-01 text"));
    }
}
