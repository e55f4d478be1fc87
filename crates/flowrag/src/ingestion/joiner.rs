//! Fan-in of converter branches

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};

/// Concatenates incoming document lists
///
/// Lists arrive in edge declaration order, so the merged stream follows
/// branch order whatever order the branches finished in. Nothing is dropped
/// or deduplicated.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentJoiner;

impl DocumentJoiner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Component for DocumentJoiner {
    fn kind(&self) -> &str {
        "document_joiner"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents).variadic()]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
        let branches = inputs.take("documents");
        let count = branches.len();
        let mut merged = Vec::new();
        for branch in branches {
            merged.extend(branch.into_documents()?);
        }
        tracing::debug!("Joined {} documents from {} branches", merged.len(), count);
        Ok(Outputs::from([("documents".to_string(), Value::Documents(merged))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, Metadata};

    #[tokio::test]
    async fn test_keeps_duplicates_and_branch_order() {
        let doc = |c: &str| Document::new(c, Metadata::new());
        let inputs = Inputs::new()
            .with("documents", Value::Documents(vec![doc("txt-1"), doc("same")]))
            .with("documents", Value::Documents(vec![]))
            .with("documents", Value::Documents(vec![doc("same")]));

        let mut outputs = DocumentJoiner.run(inputs, &RunContext::default()).await.unwrap();
        let docs = outputs.remove("documents").unwrap().into_documents().unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["txt-1", "same", "same"]);
    }
}
