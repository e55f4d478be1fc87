//! LLM provider trait for generating replies

use async_trait::async_trait;

use crate::error::Result;

/// Trait for prompt completion
///
/// Implementations:
/// - `OllamaLlm`: local Ollama server (llama3 by default)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt. Candidates are ordered; the first is authoritative.
    async fn generate(&self, prompt: &str) -> Result<Vec<String>>;

    /// Check connectivity before the first request
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
