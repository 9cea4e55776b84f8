//! Ingestion: sources → normalization → store
//!
//! Fetching (STIX over HTTP or from disk, PDF text via lopdf), the upsert
//! engine and the orchestrating [`Ingestor`].

mod fetch;
mod pdf;
mod pipeline;
mod upsert;

pub use fetch::{AttackDomain, FileStixSource, HttpStixSource, StixSource};
pub use pdf::{select_pages, LopdfExtractor, TextExtractor};
pub use pipeline::{IngestOutcome, IngestSummary, Ingestor, InitOutcome};
pub use upsert::{ApplyReport, Rejection, UpsertEngine};

use crate::storage::StorageError;
use std::path::PathBuf;

/// Errors reading a source document.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("unknown ATT&CK domain: {0}")]
    UnknownDomain(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
