//! Vector store provider trait for storing and searching embeddings

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::Document;

/// Trait for vector storage and similarity search
///
/// Indexes outlive pipeline runs. Writes already committed when a run fails
/// are not rolled back, and concurrent writers without `recreate` resolve
/// conflicts per document id, last writer wins.
///
/// Implementations:
/// - `LocalVectorStore`: in-memory or JSON-file backed, exact cosine search
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Drop and reinitialize an index. Safe on a missing index.
    async fn recreate(&self, index: &str) -> Result<()>;

    /// Create the index if missing; fail if it exists with another dimension
    async fn ensure_index(&self, index: &str) -> Result<()>;

    /// Upsert documents by id and return the number written
    ///
    /// The whole call fails, writing nothing, if any document lacks an
    /// embedding of the index dimension.
    async fn write(&self, index: &str, documents: &[Document]) -> Result<usize>;

    /// The `top_k` most similar documents, best first, ties in insertion order
    ///
    /// A missing index yields no documents and is not created.
    async fn query(&self, index: &str, embedding: &[f32], top_k: usize) -> Result<Vec<Document>>;

    /// Number of documents in an index (0 when missing)
    async fn count(&self, index: &str) -> Result<usize>;

    /// Embedding dimension enforced on new indexes
    fn dimension(&self) -> usize;

    /// Human-readable location for logs
    fn location(&self) -> &str;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Reject a batch unless every document carries a `dimension`-long embedding
pub fn validate_embeddings(documents: &[Document], dimension: usize) -> Result<()> {
    for doc in documents {
        match &doc.embedding {
            None => {
                return Err(Error::store(format!("document {} has no embedding", doc.id)));
            }
            Some(e) if e.len() != dimension => {
                return Err(Error::store(format!(
                    "document {} has embedding dimension {}, index expects {}",
                    doc.id,
                    e.len(),
                    dimension
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
