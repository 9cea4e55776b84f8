//! Storage trait definitions

use crate::graph::{Endpoint, Label, Node, Relationship};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Relationship endpoint not found: {0}")]
    MissingEndpoint(Endpoint),

    #[error("Stored row is invalid: {0}")]
    InvalidRow(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Store still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether retrying the same call may succeed (busy/locked database).
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which fields a keyword must appear in for a node to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFields {
    /// `name`, or `title` for document labels
    pub name: bool,
    pub description: bool,
    pub identifier: bool,
    /// Any member of the `aliases` list
    pub aliases: bool,
}

impl MatchFields {
    pub const ALL: MatchFields = MatchFields {
        name: true,
        description: true,
        identifier: true,
        aliases: true,
    };

    pub const NAME_AND_DESCRIPTION: MatchFields = MatchFields {
        name: true,
        description: true,
        identifier: false,
        aliases: false,
    };
}

impl Default for MatchFields {
    fn default() -> Self {
        Self::ALL
    }
}

/// Filter criteria for querying nodes
///
/// Empty `labels` means every label. Empty `keywords` matches everything;
/// otherwise a node matches when ANY keyword is a case-insensitive substring
/// of ANY selected field.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub labels: Vec<Label>,
    pub keywords: Vec<String>,
    pub fields: MatchFields,
    /// Exact match on a string property, e.g. `identifier = T1055`
    pub property_eq: Option<(String, String)>,
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn with_keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_fields(mut self, fields: MatchFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.property_eq = Some((key.into(), value.into()));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Trait for graph storage backends
///
/// Every call is self-contained: no transaction spans two calls.
/// Implementations must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    // === Schema ===

    /// Ensure the per-label uniqueness constraint and lookup indexes exist.
    fn ensure_label_schema(&self, label: Label) -> StorageResult<()>;

    // === Node Operations ===

    /// Create or replace the node at `(label, key)`; every property is overwritten.
    fn upsert_node(&self, node: &Node) -> StorageResult<()>;

    fn get_node(&self, label: Label, key: &str) -> StorageResult<Option<Node>>;

    /// Find nodes matching filter criteria, in insertion order
    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>>;

    /// Count nodes, optionally restricted to one label
    fn count_nodes(&self, label: Option<Label>) -> StorageResult<usize>;

    /// Delete every node with one of these labels, plus incident relationships.
    /// Returns the number of nodes removed.
    fn delete_labels(&self, labels: &[Label]) -> StorageResult<usize>;

    /// Delete one node and its relationships
    fn delete_node(&self, label: Label, key: &str) -> StorageResult<bool>;

    // === Relationship Operations ===

    /// Merge the relationship keyed by `(type, source, target)`.
    ///
    /// Properties are merged onto any existing edge. Fails with
    /// [`StorageError::MissingEndpoint`] when either endpoint is absent;
    /// relationships never create nodes.
    fn upsert_relationship(&self, relationship: &Relationship) -> StorageResult<()>;

    fn relationships_from(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>>;

    fn relationships_to(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>>;

    fn count_relationships(&self) -> StorageResult<usize>;

    // === Whole-graph Operations ===

    /// Remove every node and relationship
    fn clear(&self) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
