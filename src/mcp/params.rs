//! MCP tool parameter structs with schemars-derived JSON schemas.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskParams {
    #[schemars(description = "A natural-language cybersecurity or compliance question")]
    pub question: String,
    #[schemars(description = "Framework scope: 'all' (default), 'attack', 'cis', 'nist', 'hipaa', 'ffiec' or 'pci-dss'")]
    pub scope: Option<String>,
    #[schemars(description = "'smart' (default) searches classified categories; 'comprehensive' searches all of them")]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IngestFrameworkParams {
    #[schemars(description = "Framework to ingest: 'attack', 'cis', 'nist', 'hipaa', 'ffiec' or 'pci-dss'")]
    pub framework: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LookupTechniqueParams {
    #[schemars(description = "ATT&CK technique ID, e.g. T1055 or T1055.001")]
    pub technique_id: String,
    #[schemars(description = "Also list mitigations linked to the technique")]
    pub include_mitigations: Option<bool>,
}
