//! Embedding provider trait and deterministic stand-in embedders

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

/// Trait for generating text embeddings
///
/// Implementations:
/// - `HashEmbedder`: feature-hashed bag of words, deterministic
/// - `RandomEmbedder`: seeded random vectors with no meaning
/// - `OllamaEmbedder`: local Ollama server
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Load models or check connectivity; called once before first use
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Model identifier
    fn model(&self) -> &str;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// 64-bit FNV-1a
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Feature-hashing embedder over lower-cased words
///
/// Texts sharing words get positive cosine similarity, which is enough for
/// tests and offline runs without a model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: format!("feature-hash-{}", dimensions),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }
        for word in text.unicode_words() {
            let hash = fnv1a(word.to_lowercase().as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Random unit vectors, reproducible per text and seed
#[derive(Debug, Clone)]
pub struct RandomEmbedder {
    dimensions: usize,
    seed: u64,
    model: String,
}

impl RandomEmbedder {
    pub fn new(dimensions: usize, seed: u64) -> Self {
        Self {
            dimensions,
            seed,
            model: format!("random-{}", seed),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ fnv1a(text.as_bytes()));
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for RandomEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
