//! Results returned by the indexing and query entry points

use serde::{Deserialize, Serialize};

use super::document::Document;
use crate::error::Error;

/// A file that was not indexed, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// Original path of the source
    pub path: String,
    /// Error class, e.g. `ConversionError`
    pub kind: String,
    /// Human-readable reason, prefixed with the error class
    pub reason: String,
}

impl SkippedFile {
    /// Record a per-file error
    pub fn from_error(path: impl Into<String>, err: &Error) -> Self {
        let kind = err.kind().to_string();
        Self {
            path: path.into(),
            reason: format!("{}: {}", kind, err.root_cause()),
            kind,
        }
    }
}

/// Summary of an indexing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents (chunks) written to the vector store
    pub documents_written: usize,
    /// Files discovered under the root path
    pub files_total: usize,
    /// Files skipped because of unsupported types or conversion failures
    pub files_skipped: Vec<SkippedFile>,
    /// Documents dropped by the cleaner because they became empty
    pub documents_filtered: usize,
}

impl IndexReport {
    /// Number of files that made it past routing and conversion
    pub fn files_processed(&self) -> usize {
        self.files_total.saturating_sub(self.files_skipped.len())
    }
}

/// Answer to a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// The authoritative (first) reply from the generator
    pub reply: String,
    /// Documents retrieved as context, best match first
    pub documents: Vec<Document>,
}
