//! Conversational surface: classify → retrieve → answer

use crate::answer::AnswerGenerator;
use crate::framework::Scope;
use crate::llm::LlmClient;
use crate::query::{Intent, IntentClassifier, SelectiveRetriever};
use crate::storage::GraphStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// How many categories a question searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Only the categories the classifier picked
    #[default]
    Smart,
    /// Every category the scope allows
    Comprehensive,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Smart => f.write_str("smart"),
            SearchMode::Comprehensive => f.write_str("comprehensive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown search mode: {0} (expected smart or comprehensive)")]
pub struct UnknownMode(pub String);

impl FromStr for SearchMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "smart" => Ok(SearchMode::Smart),
            "comprehensive" | "full" => Ok(SearchMode::Comprehensive),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// One answered question, with what was searched to answer it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub intent: Intent,
    pub context: String,
}

impl ChatReply {
    /// `--- Searched: <categories> | Keywords: <keywords>`
    pub fn trailer(&self) -> String {
        format!(
            "--- Searched: {} | Keywords: {}",
            self.intent.category_names().join(", "),
            self.intent.keywords.join(", ")
        )
    }
}

impl fmt::Display for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.answer, self.trailer())
    }
}

pub struct ChatService {
    classifier: IntentClassifier,
    retriever: SelectiveRetriever,
    generator: AnswerGenerator,
}

impl ChatService {
    pub fn new(store: Arc<dyn GraphStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            retriever: SelectiveRetriever::new(store),
            generator: AnswerGenerator::new(llm),
        }
    }

    /// Answer `question` and append the search trailer. Never empty.
    pub async fn ask(&self, question: &str, scope: Scope, mode: SearchMode) -> String {
        if question.trim().is_empty() {
            return "Please ask a question about the knowledge base.".to_string();
        }
        self.respond(question, scope, mode).await.to_string()
    }

    pub async fn respond(&self, question: &str, scope: Scope, mode: SearchMode) -> ChatReply {
        let mut intent = self.classifier.classify(question, scope).await;
        if mode == SearchMode::Comprehensive {
            intent.categories = scope.allowed_labels();
        }
        info!(
            %scope,
            %mode,
            categories = ?intent.category_names(),
            keywords = ?intent.keywords,
            "answering question"
        );

        let context = self.retriever.retrieve(&intent.keywords, &intent.categories, scope);
        debug!(chars = context.len(), "retrieved context");
        let answer = self.generator.answer(&context, question, scope).await;

        ChatReply {
            answer,
            intent,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Framework;
    use crate::graph::{Label, Node};
    use crate::llm::MockClient;
    use crate::storage::{OpenStore, SqliteStore};

    fn store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_node(
                &Node::new(Label::Technique, "attack-pattern--1")
                    .with_property("identifier", "T1055")
                    .with_property("name", "Process Injection")
                    .with_property("description", "Adversaries may inject code into processes."),
            )
            .unwrap();
        store
    }

    #[test]
    fn mode_parses() {
        assert_eq!("Smart".parse::<SearchMode>().unwrap(), SearchMode::Smart);
        assert_eq!("comprehensive".parse::<SearchMode>().unwrap(), SearchMode::Comprehensive);
        assert!("fast".parse::<SearchMode>().is_err());
    }

    #[tokio::test]
    async fn smart_mode_searches_classified_categories() {
        let llm = Arc::new(
            MockClient::available()
                .with_response(
                    "Available categories",
                    r#"{"relevant_categories": ["techniques"], "keywords": ["T1055"], "focus": "technique"}"#,
                )
                .with_response("User Question", "Process Injection is T1055."),
        );
        let chat = ChatService::new(store(), llm.clone());
        let reply = chat.respond("What is T1055?", Scope::Only(Framework::Attack), SearchMode::Smart).await;

        assert!(reply.context.contains("T1055 - Process Injection"));
        assert_eq!(reply.answer, "Process Injection is T1055.");
        assert_eq!(reply.trailer(), "--- Searched: techniques | Keywords: T1055");
        assert!(llm.prompts()[1].contains("T1055 - Process Injection"));
    }

    #[tokio::test]
    async fn comprehensive_mode_searches_every_allowed_category() {
        let llm = Arc::new(MockClient::available().with_default(r#"{"relevant_categories": [], "keywords": ["T1055"]}"#));
        let chat = ChatService::new(store(), llm);
        let reply = chat
            .respond("T1055", Scope::Only(Framework::Attack), SearchMode::Comprehensive)
            .await;
        assert_eq!(reply.intent.categories, Framework::Attack.labels());
        assert!(reply.trailer().starts_with("--- Searched: techniques, tactics, malware"));
    }

    #[tokio::test]
    async fn model_outage_still_answers() {
        let chat = ChatService::new(store(), Arc::new(MockClient::unavailable()));
        let text = chat.ask("process injection", Scope::All, SearchMode::Smart).await;
        assert!(text.starts_with("Error generating response:"));
        assert!(text.ends_with("--- Searched: techniques, mitigations, cis_safeguards, nist_subcategories | Keywords: process injection"));

        assert!(!chat.ask("  ", Scope::All, SearchMode::Smart).await.is_empty());
    }
}
