//! External collaborator contracts: Embedder, Vector Store, and Splitter.
//!
//! The Indexing Coordinator and Query Path depend only on these traits, never
//! on a concrete implementation — callers may swap in their own embedding
//! service, vector database, or chunker. `collaborators_local` ships
//! dependency-light reference implementations of each so the crate runs
//! standalone.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// A chunk produced by a [`Splitter`]: content plus the metadata the
/// Indexing Coordinator attaches to the resulting vector record.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitChunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub file_path: Option<String>,
}

/// Splits source code into chunks suitable for embedding. An AST-based
/// splitter advertises the languages it understands via
/// [`Splitter::supported_languages`]; a fallback splitter returns an empty
/// list and accepts everything.
pub trait Splitter: Send + Sync {
    fn split(&self, code: &str, language: &str, file_path: Option<&str>) -> Vec<SplitChunk>;
    fn set_chunk_size(&mut self, size: usize);
    fn set_chunk_overlap(&mut self, overlap: usize);
    fn supported_languages(&self) -> &[&'static str] {
        &[]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub dimension: usize,
}

/// Converts text into embedding vectors. Preprocessing (tokenization,
/// truncation) is entirely the embedder's concern — the coordinator always
/// passes raw chunk text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
    fn dimension(&self) -> usize;
    fn provider_name(&self) -> &str;
    async fn detect_dimension(&self) -> Result<usize>;
}

/// A vector record as written to a [`VectorStore`]: an embedding (and,
/// for hybrid collections, a sparse term-count counterpart) paired with the
/// chunk's identity and the document payload returned on search.
#[derive(Clone, Debug)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub sparse: Option<HashMap<String, f32>>,
    pub payload: Value,
}

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    pub filter: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HybridRequest {
    pub vector: Option<Vec<f32>>,
    pub sparse: Option<HashMap<String, f32>>,
    pub limit: usize,
}

/// Predicate used by [`VectorStore::delete`]. The only shape the Indexing
/// Coordinator needs is "every record belonging to this file path".
#[derive(Clone, Debug)]
pub enum DeletePredicate {
    RelativePath(String),
}

/// Stores and searches vector records per named collection. Implementations
/// own whatever persistence or indexing structure they need; the coordinator
/// never inspects records directly, only through this contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;
    async fn create_hybrid_collection(&self, name: &str, dimension: usize) -> Result<()>;
    async fn drop_collection(&self, name: &str) -> Result<()>;
    async fn has_collection(&self, name: &str) -> Result<bool>;
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;
    async fn insert_hybrid(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;
    async fn delete(&self, collection: &str, predicate: DeletePredicate) -> Result<()>;
    async fn query(&self, collection: &str, filter: Option<&str>, limit: usize) -> Result<Vec<SearchHit>>;
    async fn search(&self, collection: &str, vector: &[f32], limit: usize, options: SearchOptions) -> Result<Vec<SearchHit>>;
    async fn hybrid_search(
        &self,
        collection: &str,
        dense: HybridRequest,
        sparse: HybridRequest,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>>;
}
