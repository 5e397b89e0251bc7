//! Deterministic, dependency-free embedder.
//!
//! Feature-hashes whitespace/identifier tokens into a fixed-width vector and
//! L2-normalizes it. Not a trained model — a reproducible stand-in so
//! indexing and querying work offline and in tests, matching the Non-goal
//! against shipping a production embedding model by default.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::collaborators::{EmbeddingVector, Embedder};
use crate::error::Result;

const DEFAULT_DIMENSION: usize = 256;

fn token_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn embed_text(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dimension];
    for token in token_re().find_iter(&text.to_lowercase()) {
        let token = token.as_str();
        let index_hash = fnv1a(token.as_bytes());
        let sign_hash = fnv1a(format!("{token}#sign").as_bytes());
        let index = (index_hash % dimension as u64) as usize;
        let sign = if sign_hash & 1 == 1 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimension: DEFAULT_DIMENSION }
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        Ok(EmbeddingVector { values: embed_text(text, self.dimension), dimension: self.dimension })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts
            .iter()
            .map(|t| EmbeddingVector { values: embed_text(t, self.dimension), dimension: self.dimension })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing-embedder"
    }

    async fn detect_dimension(&self) -> Result<usize> {
        Ok(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_across_calls() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("fn example() {}").await.unwrap();
        let b = embedder.embed("fn example() {}").await.unwrap();
        assert_eq!(a.values, b.values);
    }

    #[tokio::test]
    async fn embeddings_are_l2_normalized() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("some code with several distinct tokens here").await.unwrap();
        let norm = v.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn different_text_yields_different_vectors() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("omega").await.unwrap();
        assert_ne!(a.values, b.values);
    }

    #[tokio::test]
    async fn batch_matches_individual_calls() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        let single = embedder.embed("one").await.unwrap();
        assert_eq!(batch[0].values, single.values);
    }
}
