//! Embedding stages: document mode for indexing, query mode for RAG

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::providers::EmbeddingProvider;

/// Sets `embedding` on every document, in batches
pub struct DocumentEmbedder {
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl DocumentEmbedder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Component for DocumentEmbedder {
    fn kind(&self) -> &str {
        "document_embedder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let mut documents = inputs.documents("documents")?;
        let dimensions = self.embedder.dimensions();

        for batch in documents.chunks_mut(self.batch_size) {
            ctx.check_cancelled()?;
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} vectors for {} texts",
                    self.embedder.name(),
                    vectors.len(),
                    batch.len()
                )));
            }
            for (doc, vector) in batch.iter_mut().zip(vectors) {
                if vector.len() != dimensions {
                    return Err(Error::embedding(format!(
                        "{} returned a {}-dimensional vector, expected {}",
                        self.embedder.name(),
                        vector.len(),
                        dimensions
                    )));
                }
                doc.embedding = Some(vector);
            }
        }

        tracing::debug!(
            "Embedded {} documents with {}",
            documents.len(),
            self.embedder.model()
        );
        Ok(Outputs::from([("documents".to_string(), Value::Documents(documents))]))
    }
}

/// Embeds a single query string
pub struct TextEmbedder {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl TextEmbedder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Component for TextEmbedder {
    fn kind(&self) -> &str {
        "text_embedder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("text", PortType::Text)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("embedding", PortType::Embedding)]
    }

    async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
        let text = inputs.text("text")?;
        let embedding = self.embedder.embed(&text).await?;
        if embedding.len() != self.embedder.dimensions() {
            return Err(Error::embedding(format!(
                "{} returned a {}-dimensional query vector, expected {}",
                self.embedder.name(),
                embedding.len(),
                self.embedder.dimensions()
            )));
        }
        Ok(Outputs::from([("embedding".to_string(), Value::Embedding(embedding))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use crate::types::{Document, Metadata};

    #[tokio::test]
    async fn test_every_document_gets_an_embedding() {
        let stage = DocumentEmbedder::new(Arc::new(HashEmbedder::new(16)), 2);
        let documents: Vec<Document> = ["a", "b", "c"]
            .iter()
            .map(|c| Document::new(*c, Metadata::new()))
            .collect();
        let inputs = Inputs::new().with("documents", Value::Documents(documents));

        let mut outputs = stage.run(inputs, &RunContext::default()).await.unwrap();
        let embedded = outputs.remove("documents").unwrap().into_documents().unwrap();
        assert_eq!(embedded.len(), 3);
        assert!(embedded
            .iter()
            .all(|d| d.embedding.as_ref().map(Vec::len) == Some(16)));
        assert_eq!(embedded[2].content, "c");
    }

    #[tokio::test]
    async fn test_query_embedding_matches_document_mode() {
        let embedder = Arc::new(HashEmbedder::new(16));
        let stage = TextEmbedder::new(embedder.clone());
        let inputs = Inputs::new().with("text", Value::Text("blue sky".to_string()));
        let mut outputs = stage.run(inputs, &RunContext::default()).await.unwrap();
        let vector = outputs.remove("embedding").unwrap().into_embedding().unwrap();
        assert_eq!(vector, embedder.embed_sync("blue sky"));
    }
}
