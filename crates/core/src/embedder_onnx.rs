//! Production-quality local embedder (`semantic` feature) — a BERT-family
//! sentence-embedding model, mean-pooled and L2-normalized, loaded from the
//! Hugging Face Hub via `fastembed`/`ort`.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

use crate::collaborators::{EmbeddingVector, Embedder};
use crate::error::{CoreError, Result};

/// Resolves a preset name to a concrete `fastembed` model and its output
/// dimension. Unrecognized names fall back to the default preset rather than
/// failing, since the model catalog is `fastembed`'s and may grow.
fn resolve_preset(name: Option<&str>) -> (EmbeddingModel, usize) {
    match name {
        Some("codebert") => (EmbeddingModel::AllMiniLML6V2, 384), // no CodeBERT preset in fastembed; minilm stands in
        None | Some("minilm") | Some(_) => (EmbeddingModel::AllMiniLML6V2, 384),
    }
}

pub struct OnnxEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
    model_name: String,
}

impl OnnxEmbedder {
    pub fn new(preset: Option<&str>) -> Result<Self> {
        let (embedding_model, dimension) = resolve_preset(preset);
        let model_name = preset.unwrap_or("minilm").to_string();
        let model = TextEmbedding::try_new(InitOptions::new(embedding_model))
            .map_err(|e| CoreError::Configuration(format!("failed to load embedding model: {e}")))?;
        Ok(Self { model: Arc::new(model), dimension, model_name })
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let owned = text.to_string();
        let model = Arc::clone(&self.model);
        let dimension = self.dimension;
        tokio::task::spawn_blocking(move || {
            let mut embeddings = model
                .embed(vec![owned], None)
                .map_err(|e| CoreError::InvalidResponse { provider: "onnx-embedder".to_string(), detail: e.to_string() })?;
            let values = embeddings.pop().ok_or_else(|| CoreError::InvalidResponse {
                provider: "onnx-embedder".to_string(),
                detail: "model returned no embedding".to_string(),
            })?;
            Ok(EmbeddingVector { values, dimension })
        })
        .await
        .map_err(|e| CoreError::Watcher(e.to_string()))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let owned: Vec<String> = texts.to_vec();
        let model = Arc::clone(&self.model);
        let dimension = self.dimension;
        tokio::task::spawn_blocking(move || {
            let embeddings = model.embed(owned, None).map_err(|e| CoreError::InvalidResponse {
                provider: "onnx-embedder".to_string(),
                detail: e.to_string(),
            })?;
            Ok(embeddings.into_iter().map(|values| EmbeddingVector { values, dimension }).collect())
        })
        .await
        .map_err(|e| CoreError::Watcher(e.to_string()))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        &self.model_name
    }

    async fn detect_dimension(&self) -> Result<usize> {
        let probe = self.embed("dimension probe").await?;
        Ok(probe.values.len())
    }
}
