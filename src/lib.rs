//! CyberKG: a security knowledge graph over MITRE ATT&CK and compliance frameworks
//!
//! Ingests ATT&CK STIX bundles and five compliance frameworks (CIS Controls,
//! NIST CSF 2.0, HIPAA, FFIEC, PCI DSS) into one labeled property graph,
//! then answers natural-language questions by classifying intent,
//! retrieving scoped context and asking a language model.
//!
//! # Core Concepts
//!
//! - **Nodes**: one closed [`Label`] each, unique per `(label, key)`
//! - **Relationships**: typed, directed, unique per `(type, source, target)`
//! - **Scopes**: retrieval is restricted to one framework or all of them
//!
//! # Example
//!
//! ```
//! use cyberkg::{GraphStore, Label, OpenStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! assert_eq!(store.count_nodes(Some(Label::Technique)).unwrap(), 0);
//! ```

pub mod answer;
pub mod chat;
pub mod config;
pub mod framework;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod mcp;
pub mod normalize;
pub mod query;
pub mod services;
pub mod storage;

pub use answer::AnswerGenerator;
pub use chat::{ChatReply, ChatService, SearchMode};
pub use config::{ConfigError, Settings};
pub use framework::{Framework, Scope};
pub use graph::{Citation, Endpoint, Label, Node, PropertyValue, RelType, Relationship, RelationshipType};
pub use ingest::{AttackDomain, IngestError, IngestOutcome, IngestSummary, Ingestor, SourceError};
pub use llm::{DisabledClient, GeminiClient, LlmClient, LlmError, MockClient};
pub use query::{GraphQueries, Intent, IntentClassifier, SelectiveRetriever};
pub use services::Services;
pub use storage::{GraphStore, OpenStore, RetryPolicy, RetryingStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
