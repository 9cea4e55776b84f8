//! Retrieval, lookups and chat over an ingested fixture graph.

mod common;

use cyberkg::query::NO_RESULTS;
use cyberkg::{
    ChatService, Framework, GraphQueries, IntentClassifier, Label, MockClient, Scope, SearchMode,
    SelectiveRetriever,
};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn classified_keywords_retrieve_the_technique() {
    let store = common::ingested_store_blocking();
    let intent = IntentClassifier::interpret(
        r#"{"relevant_categories": ["techniques"], "keywords": ["T1055"]}"#,
        "Tell me about T1055",
        Scope::All,
    );
    let context = SelectiveRetriever::new(store).retrieve(&intent.keywords, &intent.categories, Scope::All);

    assert!(context.starts_with("=== ATT&CK TECHNIQUES ==="));
    assert!(context.contains("Technique: T1055 - Process Injection"));
    assert!(context.contains("Tactics: privilege-escalation"));
    assert!(context.contains("Platforms: Windows, Linux, macOS"));
    assert!(context.contains("Citations: 2 references available"));
}

#[test]
fn mitigation_block_uses_identifier_heading() {
    let store = common::ingested_store_blocking();
    let context = SelectiveRetriever::new(store).retrieve(
        &["restrict".to_string()],
        &[Label::Mitigation],
        Scope::Only(Framework::Attack),
    );
    assert!(context.starts_with("=== MITIGATIONS ==="));
    assert!(context.contains("Mitigation: M1026 - Restrict Permissions"));
}

#[test]
fn retrieval_never_returns_empty() {
    let store = common::ingested_store_blocking();
    let retriever = SelectiveRetriever::new(store);
    for keywords in [vec![], vec!["zzz-no-match".to_string()], vec!["   ".to_string()]] {
        let context = retriever.retrieve(&keywords, &[Label::Technique], Scope::All);
        assert_eq!(context, NO_RESULTS);
    }
}

#[test]
fn lookups_follow_ingested_edges() {
    let store = common::ingested_store_blocking();
    let queries = GraphQueries::new(store);

    let detail = queries.technique_by_id("T1055").unwrap().unwrap();
    assert_eq!(detail.tactics, vec!["Privilege Escalation"]);

    let by_tactic = queries.techniques_by_tactic(Some("privilege-escalation")).unwrap();
    assert_eq!(by_tactic.len(), 1);
    assert_eq!(by_tactic[0].identifier, "T1055");

    let mitigations = queries.technique_mitigations("T1055").unwrap();
    assert_eq!(mitigations[0].identifier.as_deref(), Some("M1026"));

    let stats = queries.stats().unwrap();
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.relationships, 2);
}

#[tokio::test]
async fn chat_answers_with_retrieved_context() {
    let store = common::ingested_store().await;
    let llm = Arc::new(
        MockClient::available()
            .with_response(
                "Available categories",
                r#"{"relevant_categories": ["techniques", "mitigations"], "keywords": ["T1055"], "focus": "mitigation"}"#,
            )
            .with_response(
                "User Question",
                "Process Injection (T1055) is mitigated by Restrict Permissions (M1026).",
            ),
    );
    let chat = ChatService::new(store, llm.clone());

    let text = chat
        .ask("How do I mitigate T1055?", Scope::Only(Framework::Attack), SearchMode::Smart)
        .await;
    assert!(text.starts_with("Process Injection (T1055) is mitigated"));
    assert!(text.ends_with("--- Searched: techniques, mitigations | Keywords: T1055"));

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Technique: T1055 - Process Injection"));
}

#[tokio::test]
async fn services_answer_without_a_model() {
    let dir = TempDir::new().unwrap();
    let store = common::ingested_store().await;
    let services = common::services(store, Arc::new(MockClient::unavailable()), dir.path());

    let text = services
        .chat
        .ask("process injection", Scope::All, SearchMode::Comprehensive)
        .await;
    assert!(text.starts_with("Error generating response:"));
    assert!(text.contains("--- Searched: techniques, tactics"));

    let frameworks = services.queries.framework_info().unwrap();
    assert_eq!(frameworks[0].nodes, 3);
}
