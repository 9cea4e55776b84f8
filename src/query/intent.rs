//! Question → categories + keywords, via the model

use crate::framework::Scope;
use crate::graph::Label;
use crate::llm::{extract_json, LlmClient};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the classifier decided to search for. Neither list is ever empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub categories: Vec<Label>,
    pub keywords: Vec<String>,
    pub focus: String,
}

impl Intent {
    /// Scope defaults with the whole question as the only keyword.
    pub fn fallback(question: &str, scope: Scope) -> Self {
        Self {
            categories: scope.default_labels(),
            keywords: vec![question.trim().to_string()],
            focus: String::new(),
        }
    }

    pub fn category_names(&self) -> Vec<&'static str> {
        self.categories.iter().filter_map(Label::category).collect()
    }
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn prompt(question: &str, scope: Scope) -> String {
        let allowed: Vec<&str> = scope.allowed_labels().iter().filter_map(Label::category).collect();
        format!(
            "You are classifying a cybersecurity question for a knowledge graph search over {scope}.\n\n\
             Available categories: {categories}\n\n\
             Respond with JSON only, in this shape:\n\
             {{\"relevant_categories\": [\"category\", ...], \"keywords\": [\"keyword\", ...], \"focus\": \"short description\"}}\n\n\
             Rules:\n\
             - Use only the available categories above.\n\
             - Keywords are short search terms: identifiers such as T1055, M1026, GV.OC-01 or 164.308, \
             and names such as APT29 or Process Injection.\n\
             - Prefer 1 to 5 keywords.\n\n\
             Question: {question}",
            categories = allowed.join(", "),
        )
    }

    /// Classify `question`. Model failures and unusable output fall back to
    /// scope defaults; this never fails.
    pub async fn classify(&self, question: &str, scope: Scope) -> Intent {
        match self.llm.complete(&Self::prompt(question, scope)).await {
            Ok(response) => Self::interpret(&response, question, scope),
            Err(e) => {
                warn!(error = %e, "intent classification failed, using defaults");
                Intent::fallback(question, scope)
            }
        }
    }

    /// Turn raw model output into an [`Intent`] restricted to `scope`.
    pub fn interpret(response: &str, question: &str, scope: Scope) -> Intent {
        let fallback = Intent::fallback(question, scope);
        let Some(parsed) = extract_json(response) else {
            debug!("classifier output was not JSON");
            return fallback;
        };

        let mut categories: Vec<Label> = Vec::new();
        for label in strings(&parsed, "relevant_categories")
            .filter_map(|c| Label::from_category(&c))
            .filter(|l| scope.allows(*l))
        {
            if !categories.contains(&label) {
                categories.push(label);
            }
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in strings(&parsed, "keywords") {
            if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
                keywords.push(keyword);
            }
        }

        let focus = parsed
            .get("focus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        Intent {
            categories: if categories.is_empty() { fallback.categories } else { categories },
            keywords: if keywords.is_empty() { fallback.keywords } else { keywords },
            focus,
        }
    }
}

fn strings<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = String> + 'a {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Framework;
    use crate::llm::MockClient;

    #[test]
    fn categories_outside_scope_are_discarded() {
        let intent = IntentClassifier::interpret(
            r#"{"relevant_categories": ["techniques", "cis_safeguards", "bogus"], "keywords": ["T1055"], "focus": "injection"}"#,
            "What is T1055?",
            Scope::Only(Framework::Attack),
        );
        assert_eq!(intent.categories, vec![Label::Technique]);
        assert_eq!(intent.keywords, vec!["T1055"]);
        assert_eq!(intent.focus, "injection");
    }

    #[test]
    fn empty_lists_fall_back_to_defaults() {
        let intent = IntentClassifier::interpret(
            r#"{"relevant_categories": ["cis_controls"], "keywords": []}"#,
            "How do I inventory assets?",
            Scope::Only(Framework::Attack),
        );
        assert_eq!(intent.categories, Scope::Only(Framework::Attack).default_labels());
        assert_eq!(intent.keywords, vec!["How do I inventory assets?"]);
    }

    #[test]
    fn malformed_output_falls_back() {
        let intent = IntentClassifier::interpret("I think techniques", "q", Scope::All);
        assert_eq!(intent, Intent::fallback("q", Scope::All));
        assert_eq!(
            intent.category_names(),
            vec!["techniques", "mitigations", "cis_safeguards", "nist_subcategories"]
        );
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let classifier = IntentClassifier::new(Arc::new(MockClient::unavailable()));
        let intent = classifier.classify("APT29 techniques", Scope::Only(Framework::Attack)).await;
        assert_eq!(intent.categories, vec![Label::Technique, Label::Malware, Label::ThreatGroup]);
        assert_eq!(intent.keywords, vec!["APT29 techniques"]);
    }

    #[test]
    fn prompt_lists_only_allowed_categories() {
        let prompt = IntentClassifier::prompt("q", Scope::Only(Framework::Hipaa));
        assert!(prompt.contains("hipaa_requirements"));
        assert!(!prompt.contains("techniques"));
    }
}
