//! PDF text extraction with per-framework page filtering

use super::SourceError;
use crate::framework::PdfProfile;
use crate::normalize::truncate_chars;
use std::path::Path;
use tracing::{debug, warn};

/// Turns a document on disk into prompt-sized text.
pub trait TextExtractor: Send + Sync {
    /// Fails with [`SourceError::MissingFile`] when `path` does not exist.
    fn extract(&self, path: &Path, profile: &PdfProfile) -> Result<String, SourceError>;
}

/// `lopdf`-backed extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path, profile: &PdfProfile) -> Result<String, SourceError> {
        if !path.exists() {
            return Err(SourceError::MissingFile(path.to_path_buf()));
        }
        let doc = lopdf::Document::load(path)?;
        let pages = doc.get_pages();
        debug!(path = %path.display(), pages = pages.len(), "loaded PDF");

        let texts = pages.keys().take(profile.max_pages).map(|&number| {
            let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(page = number, error = %e, "failed to extract page text");
                String::new()
            });
            (number, text)
        });
        Ok(select_pages(texts, profile))
    }
}

/// Keep pages mentioning any profile keyword, prefix each with its page
/// marker and cap the total length.
pub fn select_pages(pages: impl IntoIterator<Item = (u32, String)>, profile: &PdfProfile) -> String {
    let mut out = String::new();
    for (number, text) in pages.into_iter().take(profile.max_pages) {
        let lower = text.to_lowercase();
        if profile.page_keywords.iter().any(|k| lower.contains(k)) {
            out.push_str(&format!("\n--- Page {number} ---\n{text}"));
        }
    }
    truncate_chars(&out, profile.max_chars).to_string()
}
