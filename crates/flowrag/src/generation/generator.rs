//! LLM stage of the RAG pipeline

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::providers::LlmProvider;

/// Completes a prompt into an ordered list of candidate replies
pub struct Generator {
    llm: Arc<dyn LlmProvider>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Component for Generator {
    fn kind(&self) -> &str {
        "generator"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("prompt", PortType::Text)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("replies", PortType::Replies)]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let prompt = inputs.text("prompt")?;
        ctx.check_cancelled()?;

        let replies = self.llm.generate(&prompt).await?;
        if replies.is_empty() {
            return Err(Error::generation(format!(
                "{} returned no candidates",
                self.llm.name()
            )));
        }
        tracing::debug!("{} returned {} candidates", self.llm.model(), replies.len());
        Ok(Outputs::from([("replies".to_string(), Value::Replies(replies))]))
    }
}
