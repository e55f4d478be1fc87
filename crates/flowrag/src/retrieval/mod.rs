//! Retrieval stage and the RAG topology

pub mod rag;
pub mod retriever;

pub use rag::{build_rag_graph, RagPipeline};
pub use retriever::Retriever;
