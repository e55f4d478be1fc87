//! Embedding, storage and the indexing topology

pub mod embedder;
pub mod indexer;
pub mod writer;

pub use embedder::{DocumentEmbedder, TextEmbedder};
pub use indexer::{build_indexing_graph, check_dimensions, discover_sources, IndexingPipeline};
pub use writer::{DocumentWriter, DOCUMENTS_WRITTEN_PORT};
