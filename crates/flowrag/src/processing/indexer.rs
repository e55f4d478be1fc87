//! The indexing topology and its entry point

use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::ingestion::{
    ConverterComponent, DocumentCleaner, DocumentJoiner, DocumentSplitter, TypeRouter,
    UNCLASSIFIED_PORT,
};
use crate::pipeline::{Pipeline, PipelineInputs, RunOptions, Value};
use crate::providers::{EmbeddingProvider, Providers, VectorStoreProvider};
use crate::types::{IndexReport, SourceRef};

use super::embedder::DocumentEmbedder;
use super::writer::{DocumentWriter, DOCUMENTS_WRITTEN_PORT};

/// Stage name of the converter branch for a content type
pub fn converter_stage_name(mime: &str) -> String {
    let slug: String = mime
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_converter", slug)
}

/// Fail fast when embedder, store and config disagree on the dimension
pub fn check_dimensions(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStoreProvider,
) -> Result<()> {
    if embedder.dimensions() != store.dimension() {
        return Err(Error::config(format!(
            "embedder {} produces {}-dimensional vectors but the store at {} expects {}",
            embedder.model(),
            embedder.dimensions(),
            store.location(),
            store.dimension()
        )));
    }
    Ok(())
}

/// Wire router, converter branches, joiner, cleaner, splitter, embedder and writer
///
/// Converter branches are joined in the order of `routing.mime_types`.
pub fn build_indexing_graph(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
) -> Result<Pipeline> {
    let router = TypeRouter::new(&config.routing.mime_types)?;
    let mime_types = router.mime_types().to_vec();

    let mut builder = Pipeline::builder()
        .max_concurrency(config.processing.stage_workers())
        .add_component("router", router)
        .add_component("joiner", DocumentJoiner::new())
        .add_component("cleaner", DocumentCleaner::new(&config.cleaning)?)
        .add_component("splitter", DocumentSplitter::new(&config.chunking)?)
        .add_component(
            "embedder",
            DocumentEmbedder::new(embedder, config.embeddings.batch_size),
        )
        .add_component(
            "writer",
            DocumentWriter::new(store, config.vector_db.index.clone()),
        )
        .expose_input("router", "sources");

    for mime in &mime_types {
        let stage = converter_stage_name(mime);
        builder = builder
            .add_component(stage.clone(), ConverterComponent::for_mime(mime)?)
            .connect(format!("router.{}", mime), format!("{}.sources", stage))
            .connect(format!("{}.documents", stage), "joiner.documents");
    }

    builder
        .connect("joiner", "cleaner")
        .connect("cleaner", "splitter")
        .connect("splitter", "embedder")
        .connect("embedder", "writer")
        .build()
}

/// Every file under `root`, recursively, in path order
pub fn discover_sources(root: &Path) -> Result<Vec<SourceRef>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() {
            sources.push(SourceRef::from_path(entry.into_path()));
        }
    }
    Ok(sources)
}

/// Indexes a directory tree into the configured vector store
pub struct IndexingPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    pipeline: Pipeline,
    branches: Vec<String>,
    warmed_up: OnceCell<()>,
}

impl IndexingPipeline {
    /// Validate everything and build the graph; performs no I/O
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Result<Self> {
        config.validate()?;
        check_dimensions(embedder.as_ref(), store.as_ref())?;
        let branches = TypeRouter::new(&config.routing.mime_types)?.mime_types().to_vec();
        let pipeline = build_indexing_graph(&config, Arc::clone(&embedder), Arc::clone(&store))?;

        Ok(Self {
            config,
            embedder,
            store,
            pipeline,
            branches,
            warmed_up: OnceCell::new(),
        })
    }

    pub fn from_providers(config: RagConfig, providers: &Providers) -> Result<Self> {
        Self::new(
            config,
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.store),
        )
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run(&self, root: impl AsRef<Path>) -> Result<IndexReport> {
        self.run_with_cancel(root, CancellationToken::new()).await
    }

    /// Index every file under `root`
    ///
    /// When `recreate_index` is set the index is reset once, before any
    /// write. Writes committed before a failure or cancellation stay in
    /// the store.
    pub async fn run_with_cancel(
        &self,
        root: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<IndexReport> {
        let root = root.as_ref();
        let sources = discover_sources(root)?;
        let files_total = sources.len();
        tracing::info!("Detected {} files @ {}", files_total, root.display());

        self.warmed_up
            .get_or_try_init(|| self.embedder.warm_up())
            .await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let index = &self.config.vector_db.index;
        if self.config.vector_db.recreate_index {
            self.store.recreate(index).await?;
        } else {
            self.store.ensure_index(index).await?;
        }

        let inputs = PipelineInputs::new().with("router", "sources", Value::Sources(sources));
        let mut output = match self
            .pipeline
            .run(inputs, RunOptions::new().with_cancel(cancel))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Indexing run failed: {}", e);
                return Err(e);
            }
        };

        let mut files_skipped = match output.take("router", UNCLASSIFIED_PORT) {
            Some(value) => value.into_skipped()?,
            None => Vec::new(),
        };
        for mime in &self.branches {
            if let Some(value) = output.take(&converter_stage_name(mime), "failures") {
                files_skipped.extend(value.into_skipped()?);
            }
        }

        let documents_written = output
            .take("writer", DOCUMENTS_WRITTEN_PORT)
            .ok_or_else(|| Error::internal("writer produced no documents_written output"))?
            .into_count()?;

        let report = IndexReport {
            documents_written,
            files_total,
            files_skipped,
            documents_filtered: output.counters.documents_filtered,
        };
        tracing::info!(
            "Indexed {} files into '{}': {} documents written, {} files skipped",
            report.files_processed(),
            index,
            report.documents_written,
            report.files_skipped.len()
        );
        Ok(report)
    }
}
