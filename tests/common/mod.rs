//! Common test utilities: fixture bundles and store builders
#![allow(dead_code)]

use async_trait::async_trait;
use cyberkg::ingest::{LopdfExtractor, StixSource};
use cyberkg::normalize::StixBundle;
use cyberkg::{AttackDomain, Ingestor, LlmClient, OpenStore, Services, Settings, SourceError, SqliteStore};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// One technique (T1055, privilege-escalation), one mitigation (M1026) and
/// the `mitigates` relationship between them.
pub fn fixture_json() -> serde_json::Value {
    json!({
        "type": "bundle",
        "id": "bundle--fixture",
        "objects": [
            {
                "type": "attack-pattern",
                "id": "attack-pattern--43e7dc91-05b2-474c-b9ac-2ed4fe101f4d",
                "name": "Process Injection",
                "description": "Adversaries may inject code into processes in order to evade process-based defenses as well as possibly elevate privileges.",
                "kill_chain_phases": [
                    { "kill_chain_name": "mitre-attack", "phase_name": "privilege-escalation" }
                ],
                "x_mitre_platforms": ["Windows", "Linux", "macOS"],
                "external_references": [
                    {
                        "source_name": "mitre-attack",
                        "external_id": "T1055",
                        "url": "https://attack.mitre.org/techniques/T1055"
                    },
                    {
                        "source_name": "Elastic Process Injection July 2017",
                        "url": "https://www.elastic.co/blog/ten-process-injection-techniques"
                    }
                ]
            },
            {
                "type": "course-of-action",
                "id": "course-of-action--9bb9e696-bff8-4ae1-9454-961fc7d91d5f",
                "name": "Restrict Permissions",
                "description": "Manage the creation, modification, use, and permissions associated to privileged accounts.",
                "external_references": [
                    {
                        "source_name": "mitre-attack",
                        "external_id": "M1026",
                        "url": "https://attack.mitre.org/mitigations/M1026"
                    }
                ]
            },
            {
                "type": "relationship",
                "id": "relationship--fixture-1",
                "relationship_type": "mitigates",
                "source_ref": "course-of-action--9bb9e696-bff8-4ae1-9454-961fc7d91d5f",
                "target_ref": "attack-pattern--43e7dc91-05b2-474c-b9ac-2ed4fe101f4d"
            }
        ]
    })
}

pub fn fixture_bundle() -> StixBundle {
    StixBundle::from_json(&fixture_json().to_string()).expect("fixture bundle parses")
}

/// Serves the fixture bundle for the enterprise domain only.
pub struct FixtureSource;

#[async_trait]
impl StixSource for FixtureSource {
    async fn fetch(&self, domain: AttackDomain) -> Result<StixBundle, SourceError> {
        match domain {
            AttackDomain::Enterprise => Ok(fixture_bundle()),
            other => Err(SourceError::Unavailable(format!("no fixture for {other}"))),
        }
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
}

pub fn ingestor(store: Arc<SqliteStore>, llm: Arc<dyn LlmClient>, documents_dir: &Path) -> Ingestor {
    Ingestor::new(store, llm, Arc::new(FixtureSource), Arc::new(LopdfExtractor), documents_dir)
}

/// A store with the fixture bundle already ingested.
pub async fn ingested_store() -> Arc<SqliteStore> {
    let store = memory_store();
    let llm: Arc<dyn LlmClient> = Arc::new(cyberkg::MockClient::unavailable());
    let outcome = ingestor(store.clone(), llm, Path::new("documents"))
        .ingest_attack(AttackDomain::Enterprise)
        .await;
    assert!(outcome.is_ok(), "fixture ingest failed: {outcome:?}");
    store
}

/// [`ingested_store`] for synchronous tests.
pub fn ingested_store_blocking() -> Arc<SqliteStore> {
    tokio_test::block_on(ingested_store())
}

/// Services over `store` with the given model and the fixture STIX source.
pub fn services(store: Arc<SqliteStore>, llm: Arc<dyn LlmClient>, documents_dir: &Path) -> Services {
    let settings = Settings {
        documents_dir: documents_dir.to_path_buf(),
        ..Settings::default()
    };
    Services::assemble(
        store,
        llm,
        Arc::new(FixtureSource),
        Arc::new(LopdfExtractor),
        &settings,
        vec![AttackDomain::Enterprise],
    )
}
