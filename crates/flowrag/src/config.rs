//! Configuration for the indexing and RAG pipelines

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::generation::PromptTemplate;

/// Store location that keeps indexes in process memory
pub const IN_MEMORY_LOCATION: &str = ":memory:";

/// Main configuration, passed explicitly to every pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Vector store configuration
    pub vector_db: VectorDbConfig,
    /// Content-type routing configuration
    pub routing: RoutingConfig,
    /// Cleaner configuration
    pub cleaning: CleaningConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Generator configuration
    pub llm: LlmConfig,
    /// Prompt configuration
    pub prompt: PromptConfig,
    /// Execution configuration
    pub processing: ProcessingConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string; missing keys take defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(raw)?;
        Ok(config)
    }

    /// Check every configuration invariant. Performs no I/O.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.cleaning.validate()?;
        self.retrieval.validate()?;
        self.vector_db.validate()?;
        self.llm.validate()?;

        if self.embeddings.dimensions != self.vector_db.embedding_dim {
            return Err(Error::config(format!(
                "embedder dimension {} does not match store dimension {}",
                self.embeddings.dimensions, self.vector_db.embedding_dim
            )));
        }
        if self.routing.mime_types.is_empty() {
            return Err(Error::config("routing.mime_types must not be empty"));
        }
        PromptTemplate::parse(&self.prompt.template)?;
        Ok(())
    }
}

/// Which embedding implementation to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder
    #[default]
    Hash,
    /// Seeded random vectors, carries no meaning
    Random,
    /// Ollama embeddings endpoint
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding implementation
    pub backend: EmbeddingBackend,
    /// Model identifier
    pub model: String,
    /// Embedding dimensions
    pub dimensions: usize,
    /// Seed for the random embedder
    pub seed: u64,
    /// Batch size for document embedding
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimensions: 512,
            seed: 42,
            batch_size: 32,
        }
    }
}

/// HNSW parameters stored with each index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HnswConfig {
    /// Connections per layer
    pub m: usize,
    /// Candidate list size during construction
    pub ef_construct: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 64,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// `:memory:` or a directory holding one file per index
    pub location: String,
    /// Index name
    pub index: String,
    /// Embedding dimension enforced on every write
    pub embedding_dim: usize,
    /// Drop and recreate the index before indexing
    pub recreate_index: bool,
    /// ANN parameters
    pub hnsw: HnswConfig,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            location: IN_MEMORY_LOCATION.to_string(),
            index: "documents".to_string(),
            embedding_dim: 512,
            recreate_index: true,
            hnsw: HnswConfig::default(),
        }
    }
}

impl VectorDbConfig {
    fn validate(&self) -> Result<()> {
        if self.index.trim().is_empty() {
            return Err(Error::config("vector_db.index must not be empty"));
        }
        if self.embedding_dim == 0 {
            return Err(Error::config("vector_db.embedding_dim must be positive"));
        }
        if self.hnsw.m == 0 || self.hnsw.ef_construct == 0 {
            return Err(Error::config("vector_db.hnsw parameters must be positive"));
        }
        Ok(())
    }
}

/// Content-type routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Content types with a converter branch, in branch order
    pub mime_types: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mime_types: vec![
                "text/plain".to_string(),
                "application/pdf".to_string(),
                "text/markdown".to_string(),
            ],
        }
    }
}

/// Cleaner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Drop blank lines
    pub remove_empty_lines: bool,
    /// Collapse whitespace runs and trim
    pub remove_extra_whitespaces: bool,
    /// Remove every match of this pattern
    pub remove_regex: Option<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            remove_empty_lines: true,
            remove_extra_whitespaces: true,
            remove_regex: None,
        }
    }
}

impl CleaningConfig {
    fn validate(&self) -> Result<()> {
        if let Some(pattern) = &self.remove_regex {
            regex::Regex::new(pattern)
                .map_err(|e| Error::config(format!("invalid cleaning.remove_regex: {}", e)))?;
        }
        Ok(())
    }
}

/// Unit the splitter counts in
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitUnit {
    /// Whitespace-delimited words
    #[default]
    Word,
    /// Unicode sentences
    Sentence,
    /// Blank-line separated passages
    Passage,
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Split unit
    pub split_by: SplitUnit,
    /// Maximum units per chunk
    pub split_length: usize,
    /// Units shared by consecutive chunks
    pub split_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            split_by: SplitUnit::Word,
            split_length: 250,
            split_overlap: 25,
        }
    }
}

impl ChunkingConfig {
    /// Enforce `0 <= overlap < length`
    pub fn validate(&self) -> Result<()> {
        if self.split_length == 0 {
            return Err(Error::config("chunking.split_length must be positive"));
        }
        if self.split_overlap >= self.split_length {
            return Err(Error::config(format!(
                "chunking.split_overlap ({}) must be smaller than split_length ({})",
                self.split_overlap, self.split_length
            )));
        }
        Ok(())
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents returned per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::config("retrieval.top_k must be positive"));
        }
        Ok(())
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Options forwarded verbatim to the generator
    pub generation_options: serde_json::Map<String, serde_json::Value>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

/// Upper bound on `llm.max_retries`
pub const MAX_RETRIES: u32 = 10;

impl LlmConfig {
    fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES {
            return Err(Error::config(format!(
                "llm.max_retries must be at most {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("llm.timeout_secs must be positive"));
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            generation_options: serde_json::Map::new(),
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Template over `documents` and `query`
    pub template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: crate::generation::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Stages allowed to run at the same time (default: CPU count)
    pub max_concurrent_stages: Option<usize>,
    /// Queries answered at the same time by `ask_many`
    pub max_concurrent_queries: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_stages: None,
            max_concurrent_queries: 4,
        }
    }
}

impl ProcessingConfig {
    /// Effective worker-pool size
    pub fn stage_workers(&self) -> usize {
        self.max_concurrent_stages
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.split_length, 250);
        assert_eq!(config.chunking.split_overlap, 25);
        assert_eq!(config.vector_db.location, ":memory:");
        assert_eq!(config.vector_db.hnsw.m, 16);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_length() {
        let mut config = RagConfig::default();
        config.chunking.split_length = 10;
        config.chunking.split_overlap = 10;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.chunking.split_overlap = 9;
        config.validate().unwrap();
    }

    #[test]
    fn test_top_k_must_be_positive() {
        let mut config = RagConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 384;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("384"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RagConfig::from_toml_str(
            r#"
            [chunking]
            split_by = "sentence"
            split_length = 3
            split_overlap = 1

            [vector_db]
            index = "notes"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.split_by, SplitUnit::Sentence);
        assert_eq!(config.vector_db.index, "notes");
        assert_eq!(config.vector_db.embedding_dim, 512);
        assert_eq!(config.llm.model, "llama3");
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let mut config = RagConfig::default();
        config.cleaning.remove_regex = Some("(".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_retry_count_is_bounded() {
        let mut config = RagConfig::default();
        config.llm.max_retries = MAX_RETRIES;
        config.validate().unwrap();

        config.llm.max_retries = 64;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("max_retries"));
    }
}
