//! Provider abstractions for embeddings, LLM, and vector storage
//!
//! Components depend on these traits only, so backends can be switched
//! from configuration without touching the pipeline topology.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod vector_store;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::error::Result;

pub use embedding::{cosine_similarity, EmbeddingProvider, HashEmbedder, RandomEmbedder};
pub use llm::LlmProvider;
pub use local::LocalVectorStore;
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use vector_store::{validate_embeddings, VectorStoreProvider};

/// The shared backends both pipelines run against
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStoreProvider>,
    pub llm: Arc<dyn LlmProvider>,
}

impl Providers {
    /// Build every backend named by the config
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
            EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embeddings.dimensions)),
            EmbeddingBackend::Random => Arc::new(RandomEmbedder::new(
                config.embeddings.dimensions,
                config.embeddings.seed,
            )),
            EmbeddingBackend::Ollama => {
                Arc::new(OllamaEmbedder::new(&config.llm, &config.embeddings)?)
            }
        };
        let store: Arc<dyn VectorStoreProvider> = Arc::new(LocalVectorStore::open(&config.vector_db)?);
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::new(&config.llm)?);

        tracing::info!(
            "Providers ready: embedder={} ({}), store={} @ {}, llm={} ({})",
            embedder.name(),
            embedder.model(),
            store.name(),
            store.location(),
            llm.name(),
            llm.model()
        );

        Ok(Self { embedder, store, llm })
    }

    /// Replace the LLM, keeping embedder and store
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = llm;
        self
    }
}
