//! Wiring from [`Settings`] to the running services
//!
//! Shared by the CLI and the MCP server.

use crate::chat::ChatService;
use crate::config::Settings;
use crate::ingest::{AttackDomain, FileStixSource, HttpStixSource, Ingestor, LopdfExtractor, SourceError, StixSource, TextExtractor};
use crate::llm::{DisabledClient, GeminiClient, LlmClient};
use crate::query::GraphQueries;
use crate::storage::{GraphStore, OpenStore, RetryingStore, SqliteStore, StorageError};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to open database: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Everything a command needs, built once per process.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn GraphStore>,
    pub llm: Arc<dyn LlmClient>,
    pub ingestor: Arc<Ingestor>,
    pub chat: Arc<ChatService>,
    pub queries: Arc<GraphQueries>,
    pub domains: Vec<AttackDomain>,
}

impl Services {
    /// Open the configured database (with transient-failure retries) and
    /// connect the model, STIX and PDF sources.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServiceError> {
        let sqlite = SqliteStore::open(&settings.db_path)?;
        info!(path = %settings.db_path.display(), "opened knowledge base");
        let store: Arc<dyn GraphStore> = Arc::new(RetryingStore::new(sqlite, settings.retry.policy()));

        let llm: Arc<dyn LlmClient> = match GeminiClient::new(&settings.llm) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "language model unavailable; answers and extraction will fall back");
                Arc::new(DisabledClient::new(e.to_string()))
            }
        };
        let stix: Arc<dyn StixSource> = match &settings.stix.bundle_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "reading ATT&CK bundles from disk");
                Arc::new(FileStixSource::from_dir(dir))
            }
            None => Arc::new(HttpStixSource::new(&settings.stix)?),
        };
        let domains = attack_domains(&settings.stix.domains)?;

        Ok(Self::assemble(store, llm, stix, Arc::new(LopdfExtractor), settings, domains))
    }

    /// Build from already-constructed parts.
    pub fn assemble(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmClient>,
        stix: Arc<dyn StixSource>,
        extractor: Arc<dyn TextExtractor>,
        settings: &Settings,
        domains: Vec<AttackDomain>,
    ) -> Self {
        let ingestor = Ingestor::new(
            store.clone(),
            llm.clone(),
            stix,
            extractor,
            settings.documents_dir.clone(),
        );
        Self {
            chat: Arc::new(ChatService::new(store.clone(), llm.clone())),
            queries: Arc::new(GraphQueries::new(store.clone())),
            ingestor: Arc::new(ingestor),
            store,
            llm,
            domains,
        }
    }
}

/// Parse configured domain names; an empty list means enterprise only.
pub fn attack_domains(names: &[String]) -> Result<Vec<AttackDomain>, SourceError> {
    let mut domains = Vec::new();
    for name in names {
        let domain: AttackDomain = name.parse()?;
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    if domains.is_empty() {
        domains.push(AttackDomain::Enterprise);
    }
    Ok(domains)
}
