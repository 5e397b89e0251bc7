//! In-memory, optionally JSON-snapshotted vector store performing
//! brute-force cosine similarity, with a parallel sparse (term-count) index
//! for hybrid queries. Suitable up to the low tens of thousands of chunks per
//! collection; callers needing ANN performance at scale supply their own
//! [`VectorStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::collaborators::{DeletePredicate, HybridRequest, SearchHit, SearchOptions, VectorRecord, VectorStore};
use crate::error::{CoreError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    vector: Vec<f32>,
    sparse: Option<HashMap<String, f32>>,
    payload: serde_json::Value,
}

impl From<VectorRecord> for StoredRecord {
    fn from(r: VectorRecord) -> Self {
        Self { id: r.id, vector: r.vector, sparse: r.sparse, payload: r.payload }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CollectionData {
    dimension: usize,
    hybrid: bool,
    records: Vec<StoredRecord>,
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

fn sparse_overlap(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f64 {
    let dot: f32 = a.iter().map(|(term, weight)| weight * b.get(term).copied().unwrap_or(0.0)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

fn passes_filter(payload: &serde_json::Value, filter: Option<&str>) -> bool {
    let Some(filter) = filter else { return true };
    let Some((field, value)) = filter.split_once('=') else { return true };
    let (field, value) = (field.trim(), value.trim().trim_matches(['\'', '"']));
    payload.get(field).and_then(|v| v.as_str()).map(|v| v == value).unwrap_or(false)
}

pub struct LocalVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
    snapshot_path: Option<PathBuf>,
}

impl LocalVectorStore {
    pub fn new() -> Self {
        Self { collections: RwLock::new(HashMap::new()), snapshot_path: None }
    }

    pub fn with_snapshot_path(path: PathBuf) -> Self {
        Self { collections: RwLock::new(HashMap::new()), snapshot_path: Some(path) }
    }

    /// Loads a previously persisted snapshot, if a snapshot path was
    /// configured and the file exists.
    pub async fn load(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let collections: HashMap<String, CollectionData> = serde_json::from_str(&contents)?;
                *self.collections.write().await = collections;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    /// Persists the current state to the configured snapshot path, if any.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(&*self.collections.read().await)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl Default for LocalVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_hit(record: &StoredRecord, score: f64) -> SearchHit {
    SearchHit {
        record: VectorRecord { id: record.id.clone(), vector: record.vector.clone(), sparse: record.sparse.clone(), payload: record.payload.clone() },
        score,
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.collections.write().await.entry(name.to_string()).or_insert_with(|| CollectionData {
            dimension,
            hybrid: false,
            records: Vec::new(),
        });
        Ok(())
    }

    async fn create_hybrid_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.collections.write().await.entry(name.to_string()).or_insert_with(|| CollectionData {
            dimension,
            hybrid: true,
            records: Vec::new(),
        });
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections.entry(collection.to_string()).or_default();
        data.records.extend(records.into_iter().map(StoredRecord::from));
        Ok(())
    }

    async fn insert_hybrid(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        self.insert(collection, records).await
    }

    async fn delete(&self, collection: &str, predicate: DeletePredicate) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(data) = collections.get_mut(collection) else { return Ok(()) };
        match predicate {
            DeletePredicate::RelativePath(path) => {
                data.records.retain(|r| r.payload.get("relativePath").and_then(|v| v.as_str()) != Some(path.as_str()));
            }
        }
        Ok(())
    }

    async fn query(&self, collection: &str, filter: Option<&str>, limit: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let Some(data) = collections.get(collection) else { return Ok(Vec::new()) };
        Ok(data
            .records
            .iter()
            .filter(|r| passes_filter(&r.payload, filter))
            .take(limit)
            .map(|r| to_hit(r, 0.0))
            .collect())
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize, options: SearchOptions) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let Some(data) = collections.get(collection) else { return Ok(Vec::new()) };

        let mut hits: Vec<SearchHit> = data
            .records
            .iter()
            .filter(|r| passes_filter(&r.payload, options.filter.as_deref()))
            .map(|r| to_hit(r, cosine(vector, &r.vector)))
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        dense: HybridRequest,
        sparse: HybridRequest,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let Some(data) = collections.get(collection) else { return Ok(Vec::new()) };

        let mut hits: Vec<SearchHit> = data
            .records
            .iter()
            .filter(|r| passes_filter(&r.payload, options.filter.as_deref()))
            .map(|r| {
                let dense_score = dense.vector.as_ref().map(|v| cosine(v, &r.vector)).unwrap_or(0.0);
                let sparse_score = match (&sparse.sparse, &r.sparse) {
                    (Some(query_sparse), Some(doc_sparse)) => sparse_overlap(query_sparse, doc_sparse),
                    _ => 0.0,
                };
                let score = match (dense.vector.is_some(), sparse.sparse.is_some()) {
                    (true, true) => 0.5 * dense_score + 0.5 * sparse_score,
                    (true, false) => dense_score,
                    (false, true) => sparse_score,
                    (false, false) => 0.0,
                };
                to_hit(r, score)
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let limit = dense.limit.max(sparse.limit);
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>, relative_path: &str) -> VectorRecord {
        VectorRecord { id: id.to_string(), vector, sparse: None, payload: json!({ "relativePath": relative_path }) }
    }

    #[tokio::test]
    async fn search_returns_highest_cosine_similarity_first() {
        let store = LocalVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert("c", vec![record("a", vec![1.0, 0.0], "a.rs"), record("b", vec![0.0, 1.0], "b.rs")])
            .await
            .unwrap();

        let hits = store.search("c", &[1.0, 0.0], 10, SearchOptions::default()).await.unwrap();
        assert_eq!(hits[0].record.id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn delete_by_relative_path_removes_matching_records() {
        let store = LocalVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.insert("c", vec![record("a", vec![1.0, 0.0], "a.rs")]).await.unwrap();
        store.delete("c", DeletePredicate::RelativePath("a.rs".to_string())).await.unwrap();
        let hits = store.search("c", &[1.0, 0.0], 10, SearchOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn missing_collection_returns_empty_results_not_an_error() {
        let store = LocalVectorStore::new();
        let hits = store.search("does-not-exist", &[1.0], 10, SearchOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn hybrid_search_blends_dense_and_sparse_scores() {
        let store = LocalVectorStore::new();
        store.create_hybrid_collection("c", 2).await.unwrap();
        let mut sparse_a = HashMap::new();
        sparse_a.insert("foo".to_string(), 1.0);
        let record_a =
            VectorRecord { id: "a".to_string(), vector: vec![1.0, 0.0], sparse: Some(sparse_a), payload: json!({"relativePath": "a.rs"}) };
        store.insert_hybrid("c", vec![record_a]).await.unwrap();

        let mut query_sparse = HashMap::new();
        query_sparse.insert("foo".to_string(), 1.0);
        let hits = store
            .hybrid_search(
                "c",
                HybridRequest { vector: Some(vec![1.0, 0.0]), sparse: None, limit: 5 },
                HybridRequest { vector: None, sparse: Some(query_sparse), limit: 5 },
                SearchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.9);
    }
}
