//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flowrag::config::IN_MEMORY_LOCATION;
use flowrag::providers::{HashEmbedder, LlmProvider, LocalVectorStore, VectorStoreProvider};
use flowrag::{IndexingPipeline, RagConfig, RagPipeline, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Generator that echoes the prompt, or returns scripted candidates
#[derive(Default)]
pub struct MockLlm {
    scripted: Option<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn scripted(replies: &[&str]) -> Self {
        Self {
            scripted: Some(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        self.prompts.lock().push(prompt.to_string());
        Ok(match &self.scripted {
            Some(replies) => replies.clone(),
            None => vec![prompt.to_string()],
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }
}

pub fn config(location: &str) -> RagConfig {
    let mut config = RagConfig::default();
    config.vector_db.location = location.to_string();
    config
}

pub fn memory_config() -> RagConfig {
    config(IN_MEMORY_LOCATION)
}

pub fn store(config: &RagConfig) -> Arc<dyn VectorStoreProvider> {
    Arc::new(LocalVectorStore::open(&config.vector_db).expect("open store"))
}

pub fn indexer(config: &RagConfig, store: Arc<dyn VectorStoreProvider>) -> IndexingPipeline {
    let embedder = Arc::new(HashEmbedder::new(config.embeddings.dimensions));
    IndexingPipeline::new(config.clone(), embedder, store).expect("build indexing pipeline")
}

pub fn rag(
    config: &RagConfig,
    store: Arc<dyn VectorStoreProvider>,
    llm: Arc<dyn LlmProvider>,
) -> RagPipeline {
    let embedder = Arc::new(HashEmbedder::new(config.embeddings.dimensions));
    RagPipeline::new(config.clone(), embedder, store, llm).expect("build rag pipeline")
}

/// a.txt, b.md and a corrupt c.pdf
pub fn write_sky_corpus(dir: &Path) {
    std::fs::write(dir.join("a.txt"), "The sky is blue.").unwrap();
    std::fs::write(dir.join("b.md"), "# Sky\nThe sky is blue at noon.").unwrap();
    std::fs::write(dir.join("c.pdf"), b"%PDF-1.4\nthis is not really a pdf").unwrap();
}
