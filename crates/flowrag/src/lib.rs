//! flowrag: a dataflow graph engine for document indexing and
//! retrieval-augmented generation.
//!
//! Typed stages are wired into a validated DAG ([`pipeline::Pipeline`]) and
//! executed in dependency order. Two topologies ship with the crate:
//!
//! - indexing: router → converters → joiner → cleaner → splitter →
//!   document embedder → vector store writer ([`IndexingPipeline`])
//! - RAG: text embedder → retriever → prompt builder → generator
//!   ([`RagPipeline`])
//!
//! Configuration is always passed explicitly; there is no global pipeline
//! or store handle.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod types;

use std::path::Path;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use pipeline::{Component, Pipeline, PipelineBuilder};
pub use processing::IndexingPipeline;
pub use providers::Providers;
pub use retrieval::RagPipeline;
pub use types::{AskResponse, Document, IndexReport, SkippedFile, SourceRef};

/// Index every file under `root` with the backends named by `config`
///
/// With a `:memory:` store location the index lives only as long as this
/// call; use a directory location to query it afterwards.
pub async fn index(root: impl AsRef<Path>, config: &RagConfig) -> Result<IndexReport> {
    let providers = Providers::from_config(config)?;
    IndexingPipeline::from_providers(config.clone(), &providers)?
        .run(root)
        .await
}

/// Answer one question against the index named by `config`
pub async fn ask(query: &str, config: &RagConfig) -> Result<AskResponse> {
    let providers = Providers::from_config(config)?;
    RagPipeline::from_providers(config.clone(), &providers)?
        .ask(query)
        .await
}
