//! Storage backends for the knowledge graph
//!
//! Every backend implements the `GraphStore` trait. `SqliteStore` is the
//! persistent implementation; `RetryingStore` wraps any backend with bounded
//! retry on busy/locked errors.

mod retry;
mod sqlite;
mod traits;

pub use retry::{RetryPolicy, RetryingStore};
pub use sqlite::SqliteStore;
pub use traits::{GraphStore, MatchFields, NodeFilter, OpenStore, StorageError, StorageResult};
