//! Answer generation: retrieved context + question → model answer

use crate::framework::{Framework, Scope};
use crate::llm::LlmClient;
use std::sync::Arc;
use tracing::warn;

pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Build the prompt for `scope`: the ATT&CK expert template, a
    /// compliance template for a document framework, or the multi-framework
    /// template for every framework at once.
    pub fn prompt(context: &str, question: &str, scope: Scope) -> String {
        let (role, holdings, instructions) = match scope {
            Scope::Only(Framework::Attack) => (
                "a cybersecurity expert assistant with deep knowledge of the MITRE ATT&CK framework".to_string(),
                "ATT&CK techniques and tactics with T-codes, malware families, threat actor profiles, \
                 tools, mitigations with M-codes, data sources, and the relationships between them"
                    .to_string(),
                vec![
                    "Provide accurate, detailed responses based on the ATT&CK knowledge base",
                    "Include relevant technique IDs (T####), mitigation codes (M####), and tactic information",
                    "Reference specific threat groups, malware families, or tools when applicable",
                    "If information is not available in the knowledge base, clearly state this limitation",
                    "Suggest related ATT&CK topics or techniques that might be helpful",
                ],
            ),
            Scope::Only(framework) => (
                format!("a compliance expert assistant specializing in {}", framework.info().name),
                compliance_holdings(framework).to_string(),
                vec![
                    "Answer using the framework's own identifiers and structure",
                    "Explain what an organization must do to meet each cited item",
                    "Quote the relevant requirement text where it helps",
                    "If information is not available in the knowledge base, clearly state this limitation",
                ],
            ),
            Scope::All => (
                "a cybersecurity and compliance expert assistant".to_string(),
                "MITRE ATT&CK threat intelligence together with CIS Controls, NIST CSF 2.0, HIPAA, \
                 FFIEC and PCI DSS requirements"
                    .to_string(),
                vec![
                    "Connect threats to the controls and requirements that address them",
                    "Name the framework for every identifier you cite (T####, M####, CIS 1.1, PR.AC-01, 164.308, ...)",
                    "Highlight where frameworks overlap or complement each other",
                    "If information is not available in the knowledge base, clearly state this limitation",
                ],
            ),
        };

        let instructions: String = instructions
            .iter()
            .map(|line| format!("- {line}\n"))
            .collect();
        format!(
            "You are {role}.\n\
             You have access to a knowledge base covering {holdings}.\n\n\
             **Context from the knowledge base ({scope}):**\n{context}\n\n\
             **User Question:** {question}\n\n\
             **Instructions:**\n{instructions}\
             - Use professional terminology and provide actionable guidance\n"
        )
    }

    /// Ask the model. Failures come back as a readable message, never an error.
    pub async fn answer(&self, context: &str, question: &str, scope: Scope) -> String {
        match self.llm.complete(&Self::prompt(context, question, scope)).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("model returned an empty answer");
                "Error generating response: the model returned no text".to_string()
            }
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                format!("Error generating response: {e}")
            }
        }
    }
}

fn compliance_holdings(framework: Framework) -> &'static str {
    match framework {
        Framework::Cis => "CIS Controls and their safeguards, asset types, security functions and implementation groups",
        Framework::Nist => "NIST CSF 2.0 functions, categories and subcategories",
        Framework::Hipaa => "HIPAA regulations, sections and requirements with their CFR references",
        Framework::Ffiec => "FFIEC IT Examination Handbook sections, procedures and examination steps",
        Framework::PciDss => "PCI DSS requirements, sub-requirements and testing procedures",
        Framework::Attack => "MITRE ATT&CK",
    }
}
