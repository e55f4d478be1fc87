//! Ollama-based providers for embeddings and LLM
//!
//! Both wrap a shared `OllamaClient`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::generation::OllamaClient;

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;

/// Ollama embedding provider
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(llm: &LlmConfig, embeddings: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::from_client(
            Arc::new(OllamaClient::new(llm)?),
            embeddings.dimensions,
            embeddings.model.clone(),
        ))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, dimensions: usize, model: String) -> Self {
        Self {
            client,
            dimensions,
            model,
        }
    }

    fn check_dimensions(&self, embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() != self.dimensions {
            return Err(Error::embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn warm_up(&self) -> Result<()> {
        let probe = self.client.embed(&self.model, "warm up").await?;
        self.check_dimensions(probe)?;
        tracing::info!("Ollama embedder ready: {} ({} dims)", self.model, self.dimensions);
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.client.embed(&self.model, text).await?;
        self.check_dimensions(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for answer generation
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    options: serde_json::Map<String, serde_json::Value>,
}

impl OllamaLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(Arc::new(OllamaClient::new(config)?), config))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            options: config.generation_options.clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        let reply = self.client.generate(&self.model, prompt, &self.options).await?;
        Ok(vec![reply])
    }

    async fn warm_up(&self) -> Result<()> {
        if !self.client.health_check().await? {
            return Err(Error::generation("Ollama server is not reachable"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
