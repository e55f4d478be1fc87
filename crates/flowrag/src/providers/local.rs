//! Local vector store: process memory or one JSON file per index

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::{HnswConfig, VectorDbConfig, IN_MEMORY_LOCATION};
use crate::error::{Error, Result};
use crate::types::Document;

use super::embedding::cosine_similarity;
use super::vector_store::{validate_embeddings, VectorStoreProvider};

/// One index with its documents in insertion order
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexState {
    name: String,
    dimension: usize,
    hnsw: HnswConfig,
    created_at: DateTime<Utc>,
    documents: Vec<Document>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl IndexState {
    fn new(name: &str, dimension: usize, hnsw: HnswConfig) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            hnsw,
            created_at: Utc::now(),
            documents: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
    }

    /// Replace in place when the id exists, keeping its insertion slot
    fn upsert(&mut self, document: Document) {
        match self.positions.get(&document.id) {
            Some(&i) => self.documents[i] = document,
            None => {
                self.positions.insert(document.id.clone(), self.documents.len());
                self.documents.push(document);
            }
        }
    }
}

/// Vector store with exact cosine search
///
/// With `:memory:` indexes live as long as the handle. Otherwise `location`
/// is a directory holding `<index>.json` per index, and the file is the only
/// state: every call reads it, so handles on the same directory agree.
/// Writers to one file are serialized across handles in the process, each
/// re-reading the file under the lock before replacing it.
pub struct LocalVectorStore {
    location: String,
    root: Option<PathBuf>,
    dimension: usize,
    hnsw: HnswConfig,
    indexes: RwLock<HashMap<String, IndexState>>,
}

/// One async lock per index file, shared by every handle in the process
fn file_lock(path: &Path) -> Arc<AsyncMutex<()>> {
    static FILE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();
    FILE_LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .entry(path.to_path_buf())
        .or_default()
        .clone()
}

async fn read_state(path: &Path) -> Result<Option<IndexState>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::store(format!("failed to read {}: {}", path.display(), e)));
        }
    };
    let mut state: IndexState = serde_json::from_slice(&raw)
        .map_err(|e| Error::store(format!("corrupt index file {}: {}", path.display(), e)))?;
    state.reindex();
    tracing::debug!("Loaded index '{}' with {} documents", state.name, state.documents.len());
    Ok(Some(state))
}

/// Replace the file atomically; on error the previous file is untouched
async fn persist(path: &Path, state: &IndexState) -> Result<()> {
    let bytes = serde_json::to_vec(state)?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| Error::store(format!("failed to write {}: {}", tmp.display(), e)))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::store(format!("failed to replace {}: {}", path.display(), e)));
    }
    Ok(())
}

fn rank(state: &IndexState, embedding: &[f32], top_k: usize) -> Vec<Document> {
    let mut scored: Vec<(usize, f32)> = state
        .documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let score = doc
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(embedding, e))
                .unwrap_or(0.0);
            (i, score)
        })
        .collect();
    // Stable: equal scores keep insertion order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(i, score)| {
            let mut doc = state.documents[i].clone();
            doc.score = Some(score);
            doc
        })
        .collect()
}

impl LocalVectorStore {
    /// Store that keeps every index in memory
    pub fn in_memory(dimension: usize, hnsw: HnswConfig) -> Self {
        Self {
            location: IN_MEMORY_LOCATION.to_string(),
            root: None,
            dimension,
            hnsw,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Open the store described by the config
    pub fn open(config: &VectorDbConfig) -> Result<Self> {
        if config.location == IN_MEMORY_LOCATION {
            return Ok(Self::in_memory(config.embedding_dim, config.hnsw));
        }

        let root = PathBuf::from(&config.location);
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::store(format!("cannot create store directory {}: {}", root.display(), e))
        })?;
        // One lock per file, however the directory was spelled
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        tracing::info!("Opened vector store at {}", root.display());

        Ok(Self {
            location: config.location.clone(),
            root: Some(root),
            dimension: config.embedding_dim,
            hnsw: config.hnsw,
            indexes: RwLock::new(HashMap::new()),
        })
    }

    fn index_path(&self, index: &str) -> Result<Option<PathBuf>> {
        if index.is_empty() || index.contains(['/', '\\']) || index.starts_with('.') {
            return Err(Error::store(format!("invalid index name '{}'", index)));
        }
        Ok(self.root.as_ref().map(|r| r.join(format!("{}.json", index))))
    }

    fn check_dimension(&self, state: &IndexState) -> Result<()> {
        if state.dimension != self.dimension {
            return Err(Error::store(format!(
                "index '{}' has dimension {}, store is configured for {}",
                state.name, state.dimension, self.dimension
            )));
        }
        Ok(())
    }

    fn new_state(&self, index: &str) -> IndexState {
        IndexState::new(index, self.dimension, self.hnsw)
    }
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn recreate(&self, index: &str) -> Result<()> {
        match self.index_path(index)? {
            None => {
                self.indexes.write().insert(index.to_string(), self.new_state(index));
            }
            Some(path) => {
                let lock = file_lock(&path);
                let _guard = lock.lock().await;
                persist(&path, &self.new_state(index)).await?;
            }
        }
        tracing::info!("Recreated index '{}' at {}", index, self.location);
        Ok(())
    }

    async fn ensure_index(&self, index: &str) -> Result<()> {
        let Some(path) = self.index_path(index)? else {
            let mut guard = self.indexes.write();
            let state = guard.entry(index.to_string()).or_insert_with(|| {
                tracing::info!("Created index '{}' at {}", index, self.location);
                self.new_state(index)
            });
            return self.check_dimension(state);
        };

        let lock = file_lock(&path);
        let _guard = lock.lock().await;
        match read_state(&path).await? {
            Some(state) => self.check_dimension(&state),
            None => {
                persist(&path, &self.new_state(index)).await?;
                tracing::info!("Created index '{}' at {}", index, self.location);
                Ok(())
            }
        }
    }

    async fn write(&self, index: &str, documents: &[Document]) -> Result<usize> {
        validate_embeddings(documents, self.dimension)?;

        let Some(path) = self.index_path(index)? else {
            let mut guard = self.indexes.write();
            let state = guard
                .entry(index.to_string())
                .or_insert_with(|| self.new_state(index));
            self.check_dimension(state)?;
            for doc in documents {
                state.upsert(doc.clone());
            }
            return Ok(documents.len());
        };

        // Merge into whatever is on disk now, so writes from other handles survive
        let lock = file_lock(&path);
        let _guard = lock.lock().await;
        let mut state = read_state(&path)
            .await?
            .unwrap_or_else(|| self.new_state(index));
        self.check_dimension(&state)?;
        for doc in documents {
            state.upsert(doc.clone());
        }
        persist(&path, &state).await?;
        Ok(documents.len())
    }

    async fn query(&self, index: &str, embedding: &[f32], top_k: usize) -> Result<Vec<Document>> {
        if top_k == 0 {
            return Err(Error::config("top_k must be positive"));
        }
        if embedding.len() != self.dimension {
            return Err(Error::store(format!(
                "query embedding has dimension {}, index expects {}",
                embedding.len(),
                self.dimension
            )));
        }

        match self.index_path(index)? {
            None => match self.indexes.read().get(index) {
                Some(state) => {
                    self.check_dimension(state)?;
                    Ok(rank(state, embedding, top_k))
                }
                None => Ok(Vec::new()),
            },
            Some(path) => match read_state(&path).await? {
                Some(state) => {
                    self.check_dimension(&state)?;
                    Ok(rank(&state, embedding, top_k))
                }
                None => Ok(Vec::new()),
            },
        }
    }

    async fn count(&self, index: &str) -> Result<usize> {
        match self.index_path(index)? {
            None => Ok(self
                .indexes
                .read()
                .get(index)
                .map(|s| s.documents.len())
                .unwrap_or(0)),
            Some(path) => Ok(read_state(&path)
                .await?
                .map(|s| s.documents.len())
                .unwrap_or(0)),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn name(&self) -> &str {
        "local"
    }
}
