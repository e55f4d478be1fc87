//! The RAG topology and its entry points

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::{Generator, PromptBuilder};
use crate::pipeline::{Pipeline, PipelineInputs, RunOptions, Value};
use crate::processing::{check_dimensions, TextEmbedder};
use crate::providers::{EmbeddingProvider, LlmProvider, Providers, VectorStoreProvider};
use crate::types::AskResponse;

use super::retriever::Retriever;

/// Wire query embedder, retriever, prompt builder and generator
///
/// The caller supplies `text_embedder.text` and `prompt_builder.query`.
pub fn build_rag_graph(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    llm: Arc<dyn LlmProvider>,
) -> Result<Pipeline> {
    Pipeline::builder()
        .max_concurrency(config.processing.stage_workers())
        .add_component("text_embedder", TextEmbedder::new(embedder))
        .add_component(
            "retriever",
            Retriever::new(store, config.vector_db.index.clone(), config.retrieval.top_k)?,
        )
        .add_component("prompt_builder", PromptBuilder::from_config(&config.prompt)?)
        .add_component("llm", Generator::new(llm))
        .expose_input("text_embedder", "text")
        .expose_input("prompt_builder", "query")
        .connect("text_embedder.embedding", "retriever.query_embedding")
        .connect("retriever.documents", "prompt_builder.documents")
        .connect("prompt_builder.prompt", "llm.prompt")
        .build()
}

/// Answers questions against the configured index
///
/// The store handle is only read, so one `RagPipeline` can serve many
/// concurrent `ask` calls.
pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    llm: Arc<dyn LlmProvider>,
    pipeline: Pipeline,
    warmed_up: OnceCell<()>,
}

impl RagPipeline {
    /// Validate everything and build the graph; performs no I/O
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        config.validate()?;
        check_dimensions(embedder.as_ref(), store.as_ref())?;
        let pipeline = build_rag_graph(
            &config,
            Arc::clone(&embedder),
            Arc::clone(&store),
            Arc::clone(&llm),
        )?;

        Ok(Self {
            config,
            embedder,
            store,
            llm,
            pipeline,
            warmed_up: OnceCell::new(),
        })
    }

    pub fn from_providers(config: RagConfig, providers: &Providers) -> Result<Self> {
        Self::new(
            config,
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.store),
            Arc::clone(&providers.llm),
        )
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn ask(&self, query: &str) -> Result<AskResponse> {
        self.ask_with_cancel(query, CancellationToken::new()).await
    }

    /// Answer one question; the first generator candidate is the reply
    pub async fn ask_with_cancel(&self, query: &str, cancel: CancellationToken) -> Result<AskResponse> {
        self.warmed_up
            .get_or_try_init(|| async {
                self.embedder.warm_up().await?;
                self.llm.warm_up().await
            })
            .await?;

        // Asking only reads; a missing index retrieves nothing
        let inputs = PipelineInputs::new()
            .with("text_embedder", "text", Value::Text(query.to_string()))
            .with("prompt_builder", "query", Value::Text(query.to_string()));
        let options = RunOptions::new()
            .include_outputs_from(["retriever"])
            .with_cancel(cancel);

        let mut output = match self.pipeline.run(inputs, options).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Query failed: {}", e);
                return Err(e);
            }
        };

        let documents = output
            .take("retriever", "documents")
            .ok_or_else(|| Error::internal("retriever produced no documents output"))?
            .into_documents()?;
        let replies = output
            .take("llm", "replies")
            .ok_or_else(|| Error::internal("generator produced no replies output"))?
            .into_replies()?;

        let reply = replies
            .into_iter()
            .next()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| Error::generation("generator returned an empty reply"))?;

        tracing::info!(
            "Answered query with {} context documents (run {})",
            documents.len(),
            output.run_id
        );
        Ok(AskResponse { reply, documents })
    }

    /// Answer several questions concurrently; results follow input order
    pub async fn ask_many<S: AsRef<str>>(&self, queries: &[S]) -> Result<Vec<AskResponse>> {
        let limit = self.config.processing.max_concurrent_queries.max(1);
        stream::iter(queries)
            .map(|q| self.ask(q.as_ref()))
            .buffered(limit)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{HashEmbedder, LocalVectorStore};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
            Ok(vec![prompt.to_string(), "ignored".to_string()])
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    struct Blank;

    #[async_trait]
    impl LlmProvider for Blank {
        async fn generate(&self, _prompt: &str) -> Result<Vec<String>> {
            Ok(vec!["   ".to_string()])
        }

        fn name(&self) -> &str {
            "blank"
        }

        fn model(&self) -> &str {
            "blank"
        }
    }

    fn config() -> RagConfig {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 32;
        config.vector_db.embedding_dim = 32;
        config
    }

    fn rag(llm: Arc<dyn LlmProvider>) -> RagPipeline {
        rag_with(config(), llm)
    }

    fn rag_with(config: RagConfig, llm: Arc<dyn LlmProvider>) -> RagPipeline {
        let store = Arc::new(LocalVectorStore::open(&config.vector_db).unwrap());
        RagPipeline::new(config, Arc::new(HashEmbedder::new(32)), store, llm).unwrap()
    }

    #[tokio::test]
    async fn test_first_candidate_is_the_reply() {
        let response = rag(Arc::new(Echo)).ask("Why?").await.unwrap();
        assert!(response.reply.ends_with("Question: Why?\nAnswer:"));
        assert!(response.documents.is_empty());
    }

    #[tokio::test]
    async fn test_blank_reply_is_generation_error() {
        let err = rag(Arc::new(Blank)).ask("Why?").await.unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
    }

    #[tokio::test]
    async fn test_ask_many_keeps_order() {
        let rag = rag(Arc::new(Echo));
        let answers = rag.ask_many(&["one", "two", "three"]).await.unwrap();
        let replies: Vec<_> = answers.iter().map(|a| a.reply.as_str()).collect();
        assert!(replies[0].contains("Question: one"));
        assert!(replies[1].contains("Question: two"));
        assert!(replies[2].contains("Question: three"));
    }

    #[tokio::test]
    async fn test_ask_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.vector_db.location = dir.path().to_string_lossy().to_string();
        let index = config.vector_db.index.clone();

        let response = rag_with(config, Arc::new(Echo)).ask("Why?").await.unwrap();
        assert!(response.documents.is_empty());
        assert!(!dir.path().join(format!("{}.json", index)).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
