//! Prompt templates for RAG generation
//!
//! Templates are Tera templates over two variables, the ordered `documents`
//! list and the `query` string:
//!
//! ```text
//! {% for document in documents %} {{ document.content }} {% endfor %}
//! Question: {{ query }}
//! ```
//!
//! Each document exposes `content`, `id`, `score` and `meta`. Substituted
//! text is never interpreted as template syntax, and nothing is HTML-escaped.

use async_trait::async_trait;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::PromptConfig;
use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::types::{Document, Metadata};

/// Default RAG prompt
pub const DEFAULT_TEMPLATE: &str = "Answer the questions based on the given context.\n\nContext:\n{% for document in documents %} {{ document.content }} {% endfor %}\n\nQuestion: {{ query }}\nAnswer:";

// No .html suffix, so Tera never autoescapes it
const TEMPLATE_NAME: &str = "prompt";

/// What a template sees of one document
#[derive(Serialize)]
struct DocumentView<'a> {
    content: &'a str,
    id: &'a str,
    score: String,
    meta: &'a Metadata,
}

impl<'a> From<&'a Document> for DocumentView<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            content: &doc.content,
            id: &doc.id,
            score: doc.score.map(|s| format!("{:.4}", s)).unwrap_or_default(),
            meta: &doc.metadata,
        }
    }
}

/// A compiled prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    tera: Tera,
}

impl PromptTemplate {
    /// Compile a template; syntax errors and unknown top-level variables are
    /// configuration errors
    pub fn parse(source: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.add_raw_template(TEMPLATE_NAME, source)
            .map_err(|e| template_error(&e))?;
        let template = Self { tera };
        // An empty render resolves every variable used outside the loop
        template.render("", &[])?;
        Ok(template)
    }

    /// Render over documents in the given order
    pub fn render(&self, query: &str, documents: &[Document]) -> Result<String> {
        let views: Vec<DocumentView<'_>> = documents.iter().map(DocumentView::from).collect();
        let mut ctx = Context::new();
        ctx.insert("query", query);
        ctx.insert("documents", &views);
        self.tera
            .render(TEMPLATE_NAME, &ctx)
            .map_err(|e| template_error(&e))
    }
}

fn template_error(err: &tera::Error) -> Error {
    // Tera keeps the useful part of the message in the source chain
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    Error::config(format!("prompt template: {}", message))
}

/// Renders retrieved documents and the query into one prompt
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        Ok(Self::new(PromptTemplate::parse(&config.template)?))
    }
}

#[async_trait]
impl Component for PromptBuilder {
    fn kind(&self) -> &str {
        "prompt_builder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("documents", PortType::Documents),
            PortSpec::new("query", PortType::Text),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("prompt", PortType::Text)]
    }

    async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
        let documents = inputs.documents("documents")?;
        let query = inputs.text("query")?;
        let prompt = self.template.render(&query, &documents)?;
        tracing::debug!(
            "Built prompt from {} documents ({} chars)",
            documents.len(),
            prompt.len()
        );
        Ok(Outputs::from([("prompt".to_string(), Value::Text(prompt))]))
    }
}
