//! Ingestion orchestration
//!
//! Each ATT&CK domain and each document framework is ingested on its own:
//! a failure in one is reported as [`IngestOutcome::Failed`] and the others
//! continue.

use super::fetch::{AttackDomain, StixSource};
use super::pdf::TextExtractor;
use super::upsert::{ApplyReport, Rejection, UpsertEngine};
use super::{IngestError, SourceError};
use crate::framework::{Framework, FrameworkSchema};
use crate::graph::{Endpoint, Label, Relationship};
use crate::llm::{extract_json, LlmClient};
use crate::normalize::{has_root_entries, normalize_bundle, normalize_document, NormalizedGraph, StixBundle};
use crate::storage::{GraphStore, NodeFilter};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of ingesting one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ingested {
        report: ApplyReport,
        /// The built-in sample tree was used instead of extracted content.
        used_fallback: bool,
    },
    Failed {
        reason: String,
    },
}

impl IngestOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, IngestOutcome::Ingested { .. })
    }

    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            IngestOutcome::Ingested { report, .. } => Some(report),
            IngestOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub attack: Vec<(AttackDomain, IngestOutcome)>,
    pub frameworks: Vec<(Framework, IngestOutcome)>,
}

impl IngestSummary {
    pub fn failures(&self) -> usize {
        self.attack
            .iter()
            .map(|(_, o)| o)
            .chain(self.frameworks.iter().map(|(_, o)| o))
            .filter(|o| !o.is_ok())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InitOutcome {
    /// The store already held nodes; nothing was ingested.
    AlreadyInitialized { nodes: usize },
    Initialized(Vec<(AttackDomain, IngestOutcome)>),
}

/// Drives every ingestion path against one store.
pub struct Ingestor {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmClient>,
    stix: Arc<dyn StixSource>,
    extractor: Arc<dyn TextExtractor>,
    documents_dir: PathBuf,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmClient>,
        stix: Arc<dyn StixSource>,
        extractor: Arc<dyn TextExtractor>,
        documents_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            llm,
            stix,
            extractor,
            documents_dir: documents_dir.into(),
        }
    }

    fn engine(&self) -> UpsertEngine<'_> {
        UpsertEngine::new(self.store.as_ref())
    }

    // === ATT&CK ===

    /// Normalize and apply a bundle already in memory.
    pub fn ingest_bundle(&self, bundle: &StixBundle) -> ApplyReport {
        let graph = normalize_bundle(bundle);
        info!(
            nodes = graph.nodes.len(),
            relationships = graph.relationships.len(),
            other = graph.stats.other,
            dropped = graph.stats.dropped,
            "normalized STIX bundle"
        );
        self.engine().apply(&graph.nodes, &graph.relationships)
    }

    pub async fn ingest_attack(&self, domain: AttackDomain) -> IngestOutcome {
        match self.stix.fetch(domain).await {
            Ok(bundle) => IngestOutcome::Ingested {
                report: self.ingest_bundle(&bundle),
                used_fallback: false,
            },
            Err(e) => {
                warn!(%domain, error = %e, "ATT&CK ingestion failed");
                IngestOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    pub async fn ingest_attack_domains(&self, domains: &[AttackDomain]) -> Vec<(AttackDomain, IngestOutcome)> {
        let mut outcomes = Vec::with_capacity(domains.len());
        for &domain in domains {
            outcomes.push((domain, self.ingest_attack(domain).await));
        }
        outcomes
    }

    // === Document frameworks ===

    /// Ingest one framework. ATT&CK means the enterprise domain.
    pub async fn ingest_framework(&self, framework: Framework) -> IngestOutcome {
        let Some(schema) = framework.schema() else {
            return self.ingest_attack(AttackDomain::Enterprise).await;
        };

        let text = match self.read_document(schema).await {
            Ok(text) => text,
            Err(e) => {
                warn!(%framework, error = %e, "framework ingestion failed");
                return IngestOutcome::Failed { reason: e.to_string() };
            }
        };

        match self.ingest_document_text(framework, &text).await {
            Ok((report, used_fallback)) => IngestOutcome::Ingested { report, used_fallback },
            Err(e) => {
                warn!(%framework, error = %e, "framework ingestion failed");
                IngestOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn read_document(&self, schema: &'static FrameworkSchema) -> Result<String, IngestError> {
        let path = self.documents_dir.join(schema.pdf.file_name);
        if !path.exists() {
            return Err(SourceError::MissingFile(path).into());
        }
        let extractor = Arc::clone(&self.extractor);
        match tokio::task::spawn_blocking(move || extractor.extract(&path, &schema.pdf)).await? {
            Ok(text) => {
                info!(framework = schema.title, chars = text.len(), "extracted document text");
                Ok(text)
            }
            Err(e @ SourceError::MissingFile(_)) => Err(e.into()),
            // An unreadable document degrades to the sample tree, like empty text.
            Err(e) => {
                warn!(framework = schema.title, error = %e, "could not read document text, using sample data");
                Ok(String::new())
            }
        }
    }

    /// Extract, normalize and apply a framework from already-extracted text.
    ///
    /// Returns the apply report and whether the sample tree was used.
    pub async fn ingest_document_text(
        &self,
        framework: Framework,
        text: &str,
    ) -> Result<(ApplyReport, bool), IngestError> {
        let Some(schema) = framework.schema() else {
            return Err(SourceError::Unavailable(format!("{framework} is not a document framework")).into());
        };

        let (tree, used_fallback) = self.extract_tree(schema, text).await;
        let ingested_at = chrono::Utc::now().to_rfc3339();
        let graph = normalize_document(schema, &tree, &ingested_at);

        let mut report = self.engine().apply(&graph.nodes, &graph.relationships);
        report.merge(self.link_cross_references(schema, &graph));
        info!(
            %framework,
            nodes = report.nodes_applied,
            relationships = report.relationships_applied,
            used_fallback,
            "ingested framework"
        );
        Ok((report, used_fallback))
    }

    /// Ask the model for the framework tree; fall back to the sample tree on
    /// empty text, model failure, unparseable output or an empty top level.
    async fn extract_tree(&self, schema: &FrameworkSchema, text: &str) -> (Value, bool) {
        if text.trim().is_empty() {
            warn!(framework = schema.title, "no document text, using sample data");
            return (schema.sample_tree(), true);
        }

        let response = match self.llm.complete(&schema.extraction_prompt(text)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(framework = schema.title, error = %e, "extraction failed, using sample data");
                return (schema.sample_tree(), true);
            }
        };

        match extract_json(&response) {
            Some(tree) if has_root_entries(schema, &tree) => (tree, false),
            Some(_) => {
                warn!(framework = schema.title, "extraction returned no entries, using sample data");
                (schema.sample_tree(), true)
            }
            None => {
                warn!(framework = schema.title, "extraction returned invalid JSON, using sample data");
                (schema.sample_tree(), true)
            }
        }
    }

    /// Link document nodes to the ATT&CK mitigations named in the schema's
    /// cross-reference table. Mitigations not in the store are skipped.
    fn link_cross_references(&self, schema: &FrameworkSchema, graph: &NormalizedGraph) -> ApplyReport {
        let mut report = ApplyReport::default();
        for xref in schema.cross_references {
            for mitigation_id in xref.mitigation_ids {
                let filter = NodeFilter::new()
                    .with_label(Label::Mitigation)
                    .with_property("identifier", *mitigation_id)
                    .with_limit(1);
                let target = match self.store.find_nodes(&filter) {
                    Ok(mut found) if !found.is_empty() => found.remove(0),
                    Ok(_) => {
                        debug!(mitigation = %mitigation_id, "cross-reference target not in store");
                        continue;
                    }
                    Err(e) => {
                        warn!(mitigation = %mitigation_id, error = %e, "cross-reference lookup failed");
                        continue;
                    }
                };
                let target = Endpoint::new(target.label, target.key);

                for node in graph.nodes_with_label(xref.label).filter(|n| xref.keys.matches(&n.key)) {
                    let rel = Relationship::new(xref.rel, Endpoint::new(node.label, node.key.clone()), target.clone());
                    match self.store.upsert_relationship(&rel) {
                        Ok(()) => report.relationships_applied += 1,
                        Err(e) => report.rejections.push(Rejection {
                            item: format!("{} -[{}]-> {}", rel.source, rel.rel_type, rel.target),
                            reason: e.to_string(),
                        }),
                    }
                }
            }
        }
        report
    }

    // === Lifecycle ===

    /// Every configured ATT&CK domain, then every document framework.
    pub async fn ingest_all(&self, domains: &[AttackDomain]) -> IngestSummary {
        let attack = self.ingest_attack_domains(domains).await;
        let mut frameworks = Vec::with_capacity(Framework::DOCUMENTS.len());
        for framework in Framework::DOCUMENTS {
            frameworks.push((framework, self.ingest_framework(framework).await));
        }
        IngestSummary { attack, frameworks }
    }

    /// Ingest ATT&CK only when the store is empty.
    pub async fn initialize(&self, domains: &[AttackDomain]) -> Result<InitOutcome, IngestError> {
        let nodes = self.store.count_nodes(None)?;
        if nodes > 0 {
            info!(nodes, "knowledge base already initialized");
            return Ok(InitOutcome::AlreadyInitialized { nodes });
        }
        Ok(InitOutcome::Initialized(self.ingest_attack_domains(domains).await))
    }

    /// Wipe, then re-ingest everything.
    pub async fn refresh(&self, domains: &[AttackDomain]) -> Result<IngestSummary, IngestError> {
        self.reset()?;
        Ok(self.ingest_all(domains).await)
    }

    pub fn reset(&self) -> Result<(), IngestError> {
        Ok(self.engine().wipe()?)
    }

    pub fn delete_framework(&self, framework: Framework) -> Result<usize, IngestError> {
        Ok(self.engine().delete_framework(framework)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FileStixSource, LopdfExtractor};
    use crate::llm::MockClient;
    use crate::storage::{OpenStore, SqliteStore};

    fn ingestor(llm: MockClient, documents_dir: PathBuf) -> (Arc<SqliteStore>, Ingestor) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(llm),
            Arc::new(FileStixSource::new()),
            Arc::new(LopdfExtractor),
            documents_dir,
        );
        (store, ingestor)
    }

    #[tokio::test]
    async fn empty_text_uses_sample_tree_for_every_framework() {
        let (store, ingestor) = ingestor(MockClient::available(), PathBuf::from("documents"));
        for framework in Framework::DOCUMENTS {
            let (report, used_fallback) = ingestor.ingest_document_text(framework, "   ").await.unwrap();
            assert!(used_fallback, "{framework} did not fall back");
            for label in framework.labels() {
                assert!(report.count(label) > 0, "{framework} produced no {label}");
            }
        }
        assert_eq!(store.count_nodes(Some(Label::Citation)).unwrap(), 5);
    }

    #[tokio::test]
    async fn extracted_tree_is_used_when_valid() {
        let llm = MockClient::available().with_response(
            "CIS Controls",
            "```json\n{\"controls\": [{\"id\": \"CIS-7\", \"name\": \"Continuous Vulnerability Management\", \
             \"safeguards\": [{\"id\": \"7.1\", \"description\": \"Establish a vulnerability process\"}]}]}\n```",
        );
        let (store, ingestor) = ingestor(llm, PathBuf::from("documents"));
        let (report, used_fallback) = ingestor
            .ingest_document_text(Framework::Cis, "--- Page 1 ---\nControl 7")
            .await
            .unwrap();

        assert!(!used_fallback);
        assert_eq!(report.count(Label::CisControl), 1);
        assert_eq!(report.count(Label::CisSafeguard), 1);
        assert!(store.get_node(Label::CisSafeguard, "7.1").unwrap().is_some());
    }

    #[tokio::test]
    async fn model_failure_and_empty_tree_fall_back() {
        let llm = MockClient::available()
            .with_failure("NIST", "quota exceeded")
            .with_response("HIPAA", "{\"regulations\": []}");
        let (_, ingestor) = ingestor(llm, PathBuf::from("documents"));

        let (_, nist_fallback) = ingestor.ingest_document_text(Framework::Nist, "text").await.unwrap();
        let (_, hipaa_fallback) = ingestor.ingest_document_text(Framework::Hipaa, "text").await.unwrap();
        assert!(nist_fallback);
        assert!(hipaa_fallback);
    }

    #[tokio::test]
    async fn missing_pdf_fails_only_that_framework() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ingestor) = ingestor(MockClient::available(), dir.path().to_path_buf());

        let outcome = ingestor.ingest_framework(Framework::Ffiec).await;
        assert!(matches!(outcome, IngestOutcome::Failed { ref reason } if reason.contains("not found")));
        assert_eq!(store.count_nodes(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn cross_references_link_to_existing_mitigations() {
        let (store, ingestor) = ingestor(MockClient::available(), PathBuf::from("documents"));
        store
            .upsert_node(
                &crate::graph::Node::new(Label::Mitigation, "course-of-action--m1013")
                    .with_property("name", "Application Developer Guidance")
                    .with_property("identifier", "M1013"),
            )
            .unwrap();

        let (report, _) = ingestor.ingest_document_text(Framework::Cis, "").await.unwrap();
        assert!(report.rejections.is_empty());

        let implements: Vec<_> = store
            .relationships_to(&Endpoint::new(Label::Mitigation, "course-of-action--m1013"))
            .unwrap();
        let mut sources: Vec<&str> = implements.iter().map(|r| r.source.key.as_str()).collect();
        sources.sort();
        assert_eq!(sources, vec!["1.1", "2.1"]);
    }

    #[tokio::test]
    async fn initialize_skips_populated_store() {
        let (store, ingestor) = ingestor(MockClient::available(), PathBuf::from("documents"));
        store
            .upsert_node(&crate::graph::Node::new(Label::Tactic, "tactic--execution"))
            .unwrap();
        let outcome = ingestor.initialize(&[AttackDomain::Enterprise]).await.unwrap();
        assert_eq!(outcome, InitOutcome::AlreadyInitialized { nodes: 1 });
    }

    #[tokio::test]
    async fn unavailable_stix_source_is_reported_per_domain() {
        let (_, ingestor) = ingestor(MockClient::available(), PathBuf::from("documents"));
        let outcomes = ingestor
            .ingest_attack_domains(&[AttackDomain::Enterprise, AttackDomain::Mobile])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| !o.is_ok()));
    }
}
