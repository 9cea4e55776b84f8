//! Node representation in the knowledge graph

use super::label::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a JSON value. `null` has no property form.
    pub fn from_json(value: &serde_json::Value) -> Option<PropertyValue> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(PropertyValue::String(s.clone())),
            Value::Array(items) => Some(PropertyValue::Array(
                items.iter().filter_map(PropertyValue::from_json).collect(),
            )),
            Value::Object(map) => Some(PropertyValue::Object(
                map.iter()
                    .filter_map(|(k, v)| PropertyValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// String members of an array value. Non-string members are skipped.
    pub fn as_str_list(&self) -> Vec<&str> {
        match self {
            PropertyValue::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
            PropertyValue::String(s) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Int(n)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(items: Vec<String>) -> Self {
        PropertyValue::Array(items.into_iter().map(PropertyValue::String).collect())
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(items: Vec<&str>) -> Self {
        PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect())
    }
}

/// Properties collection, ordered so stored JSON is stable across runs.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single external reference attached to a source object.
///
/// Kept structured; [`Citation::render`] gives the flattened
/// `id | source | url` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Citation {
    pub const DELIMITER: &'static str = " | ";

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.source.is_none() && self.url.is_none()
    }

    pub fn render(&self) -> String {
        [&self.id, &self.source, &self.url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(Self::DELIMITER)
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A node in the knowledge graph, unique per `(label, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub label: Label,
    /// Label-scoped identity key (STIX id, `tactic--<short>`, or a document code)
    pub key: String,
    pub properties: Properties,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl Node {
    pub fn new(label: Label, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
            properties: Properties::new(),
            citations: Vec::new(),
        }
    }

    /// Builder: set a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_str)
    }

    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.properties
            .get(key)
            .map(PropertyValue::as_str_list)
            .unwrap_or_default()
    }

    /// Display name: `name`, falling back to `title` for document labels.
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
            .or_else(|| self.get_str("title"))
            .filter(|s| !s.is_empty())
    }

    pub fn description(&self) -> Option<&str> {
        self.get_str("description")
    }

    /// Primary identifier (`T1055`, `M1026`, `GV.OC-01`).
    pub fn identifier(&self) -> Option<&str> {
        self.get_str("identifier").filter(|s| !s.is_empty())
    }

    /// Flattened citation strings.
    pub fn citation_strings(&self) -> Vec<String> {
        self.citations.iter().map(Citation::render).collect()
    }
}
