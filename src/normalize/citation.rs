//! External references → citations

use crate::graph::Citation;
use serde::Deserialize;

/// One entry of a STIX object's `external_references` list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalReference {
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The ATT&CK identifier (`T1055`, `M1026`, `G0016`) carried by the
/// `mitre-attack` reference, if any.
pub fn attack_identifier(refs: &[ExternalReference]) -> Option<&str> {
    refs.iter()
        .find(|r| r.source_name.as_deref() == Some("mitre-attack"))
        .and_then(|r| r.external_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Turn external references into citations, preserving order.
///
/// References with none of id, source or url are skipped. Duplicates are
/// kept.
pub fn extract_citations(refs: &[ExternalReference]) -> Vec<Citation> {
    refs.iter()
        .map(|r| Citation {
            id: non_empty(&r.external_id),
            source: non_empty(&r.source_name),
            url: non_empty(&r.url),
        })
        .filter(|c| !c.is_empty())
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(source: Option<&str>, id: Option<&str>, url: Option<&str>) -> ExternalReference {
        ExternalReference {
            source_name: source.map(String::from),
            external_id: id.map(String::from),
            url: url.map(String::from),
            description: None,
        }
    }

    #[test]
    fn renders_present_parts_in_order() {
        let refs = vec![
            reference(
                Some("mitre-attack"),
                Some("T1055"),
                Some("https://attack.mitre.org/techniques/T1055"),
            ),
            reference(Some("Elastic Process Injection July 2017"), None, None),
        ];
        let rendered: Vec<String> = extract_citations(&refs).iter().map(Citation::render).collect();
        assert_eq!(
            rendered,
            vec![
                "T1055 | mitre-attack | https://attack.mitre.org/techniques/T1055".to_string(),
                "Elastic Process Injection July 2017".to_string(),
            ]
        );
    }

    #[test]
    fn skips_empty_references_and_keeps_duplicates() {
        let refs = vec![
            reference(None, None, None),
            reference(Some(""), Some("  "), None),
            reference(Some("capec"), Some("CAPEC-640"), None),
            reference(Some("capec"), Some("CAPEC-640"), None),
        ];
        assert_eq!(extract_citations(&refs).len(), 2);
    }

    #[test]
    fn attack_identifier_comes_from_mitre_reference() {
        let refs = vec![
            reference(Some("capec"), Some("CAPEC-640"), None),
            reference(Some("mitre-attack"), Some("T1055"), None),
        ];
        assert_eq!(attack_identifier(&refs), Some("T1055"));
        assert_eq!(attack_identifier(&refs[..1]), None);
    }
}
