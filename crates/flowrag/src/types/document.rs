//! Document and source types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Metadata key holding the originating file path
pub const META_FILE_PATH: &str = "file_path";
/// Metadata key holding the resolved content type
pub const META_CONTENT_TYPE: &str = "content_type";
/// Metadata key linking a chunk to its parent document
pub const META_SOURCE_ID: &str = "source_id";
/// Metadata key holding the chunk index within its parent
pub const META_SPLIT_ID: &str = "split_id";
/// Metadata key holding the chunk's byte offset in the parent content
pub const META_SPLIT_START: &str = "split_idx_start";
/// Metadata key holding the number of overlapping units shared with the previous chunk
pub const META_SPLIT_OVERLAP: &str = "split_overlap";

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    /// Get the value as a string slice, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Document metadata, ordered by key so hashing and serialization are stable
pub type Metadata = BTreeMap<String, MetaValue>;

/// The unit of data flowing through a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content-addressed identifier
    pub id: String,
    /// Text content
    pub content: String,
    /// Scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Embedding vector, set by the document embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Similarity score, set by the retriever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    /// Create a document whose id is derived from its content and metadata
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        let content = content.into();
        let id = Self::compute_id(&content, &metadata);
        Self {
            id,
            content,
            metadata,
            embedding: None,
            score: None,
        }
    }

    /// Create a document with an explicit id
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata,
            embedding: None,
            score: None,
        }
    }

    /// SHA-256 over content and metadata, hex encoded
    pub fn compute_id(content: &str, metadata: &Metadata) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        for (key, value) in metadata {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Look up a metadata value
    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    /// Builder-style embedding setter
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A file submitted to the indexing pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Path to the source file
    pub path: PathBuf,
    /// Declared content type; sniffed from the extension when absent
    pub content_type: Option<String>,
}

impl SourceRef {
    /// Create a source with a sniffed content type
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content_type = detect_content_type(&path);
        Self { path, content_type }
    }

    /// Create a source with a declared content type
    pub fn with_content_type(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: Some(content_type.into()),
        }
    }

    /// Path rendered for reports and metadata
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// Guess a MIME type from a file extension
pub fn detect_content_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "md" | "markdown" => Some("text/markdown".to_string()),
        _ => mime_guess::from_ext(&ext).first_raw().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_content_addressed() {
        let mut meta = Metadata::new();
        meta.insert("file_path".to_string(), "a.txt".into());

        let a = Document::new("The sky is blue.", meta.clone());
        let b = Document::new("The sky is blue.", meta.clone());
        assert_eq!(a.id, b.id);

        meta.insert("split_id".to_string(), 1usize.into());
        let c = Document::new("The sky is blue.", meta);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type(Path::new("a.txt")).as_deref(), Some("text/plain"));
        assert_eq!(detect_content_type(Path::new("b.md")).as_deref(), Some("text/markdown"));
        assert_eq!(detect_content_type(Path::new("c.PDF")).as_deref(), Some("application/pdf"));
        assert_eq!(detect_content_type(Path::new("noext")), None);
    }

    #[test]
    fn test_metadata_serializes_as_scalars() {
        let mut meta = Metadata::new();
        meta.insert("page_count".to_string(), 3usize.into());
        meta.insert("file_path".to_string(), "c.pdf".into());
        let doc = Document::new("x", meta);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["metadata"]["page_count"], 3);
        assert_eq!(json["metadata"]["file_path"], "c.pdf");
        assert!(json.get("embedding").is_none());
    }
}
