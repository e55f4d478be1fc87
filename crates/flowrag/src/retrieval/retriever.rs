//! Similarity retrieval stage

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::providers::VectorStoreProvider;

/// Returns the `top_k` documents closest to a query embedding
pub struct Retriever {
    store: Arc<dyn VectorStoreProvider>,
    index: String,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStoreProvider>, index: impl Into<String>, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::config("top_k must be positive"));
        }
        Ok(Self {
            store,
            index: index.into(),
            top_k,
        })
    }
}

#[async_trait]
impl Component for Retriever {
    fn kind(&self) -> &str {
        "retriever"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("query_embedding", PortType::Embedding)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
        let embedding = inputs.embedding("query_embedding")?;
        let documents = self.store.query(&self.index, &embedding, self.top_k).await?;
        tracing::debug!(
            "Retrieved {} of at most {} documents from '{}'",
            documents.len(),
            self.top_k,
            self.index
        );
        Ok(Outputs::from([("documents".to_string(), Value::Documents(documents))]))
    }
}
