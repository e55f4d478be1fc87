//! Terminal indexing stage

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::providers::VectorStoreProvider;

/// Output port carrying how many documents this run wrote
pub const DOCUMENTS_WRITTEN_PORT: &str = "documents_written";

/// Writes embedded documents into one index of the vector store
pub struct DocumentWriter {
    store: Arc<dyn VectorStoreProvider>,
    index: String,
}

impl DocumentWriter {
    pub fn new(store: Arc<dyn VectorStoreProvider>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
        }
    }
}

#[async_trait]
impl Component for DocumentWriter {
    fn kind(&self) -> &str {
        "document_writer"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new(DOCUMENTS_WRITTEN_PORT, PortType::Count)]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let documents = inputs.documents("documents")?;
        ctx.check_cancelled()?;

        let written = if documents.is_empty() {
            0
        } else {
            self.store.write(&self.index, &documents).await?
        };
        ctx.stats().add_written(written);
        tracing::info!(
            "{} documents have been written to {}",
            written,
            self.store.location()
        );
        Ok(Outputs::from([(
            DOCUMENTS_WRITTEN_PORT.to_string(),
            Value::Count(written),
        )]))
    }
}
