//! Query Path — embeds the query, dispatches dense or hybrid vector search
//! against a root's collection, feeds the Ranker, and shapes the output.

use std::path::Path;

use crate::collaborators::{HybridRequest, SearchOptions, VectorRecord};
use crate::coordinator::{sparse_terms, IndexingCoordinator};
use crate::error::{CoreError, Result};
use crate::ranker::{language_of, Ranker, VectorHit};

#[derive(Clone, Debug)]
pub struct QueryHit {
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub score: f64,
}

fn record_field_str(record: &VectorRecord, field: &str) -> Result<String> {
    record
        .payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidResponse { provider: "vector-store".to_string(), detail: format!("record missing `{field}`") })
}

fn record_field_u64(record: &VectorRecord, field: &str) -> Result<u64> {
    record
        .payload
        .get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| CoreError::InvalidResponse { provider: "vector-store".to_string(), detail: format!("record missing `{field}`") })
}

fn to_vector_hit(record: &VectorRecord, score: f64) -> Result<VectorHit> {
    let relative_path = record_field_str(record, "relativePath")?;
    let content = record_field_str(record, "content")?;
    let start_line = record_field_u64(record, "startLine")? as usize;
    let end_line = record_field_u64(record, "endLine")? as usize;
    let modified_at_ms = record_field_u64(record, "modifiedAtMs").unwrap_or(0);
    let extension = relative_path.rsplit('.').next().unwrap_or("").to_string();

    let mut metadata = std::collections::HashMap::new();
    if let Some(obj) = record.payload.as_object() {
        for (k, v) in obj {
            metadata.insert(k.clone(), v.clone());
        }
    }

    Ok(VectorHit { content, relative_path, start_line, end_line, extension, modified_at_ms, vector_score: score, metadata })
}

impl IndexingCoordinator {
    /// Returns `[]` for a root with no collection rather than an error; a
    /// malformed vector-store record (missing the fields the coordinator
    /// always writes) raises a typed error instead of silently dropping it.
    pub async fn semantic_search(
        &self,
        root: &Path,
        query: &str,
        top_k: usize,
        min_score: f64,
        filter: Option<&str>,
        enable_ranking: bool,
    ) -> Result<Vec<QueryHit>> {
        let name = self.get_collection_name(root);
        if !self.vector_store().has_collection(&name).await? {
            return Ok(Vec::new());
        }

        let embedding = self.embedder().embed(query).await?;
        let options = SearchOptions { filter: filter.map(str::to_string) };

        let hits = if self.config().hybrid_mode {
            let dense = HybridRequest { vector: Some(embedding.values.clone()), sparse: None, limit: top_k };
            let sparse = HybridRequest { vector: None, sparse: Some(sparse_terms(query)), limit: top_k };
            self.vector_store().hybrid_search(&name, dense, sparse, options).await?
        } else {
            self.vector_store().search(&name, &embedding.values, top_k, options).await?
        };

        let vector_hits: Vec<VectorHit> = hits.iter().map(|h| to_vector_hit(&h.record, h.score)).collect::<Result<_>>()?;

        let ranked = if enable_ranking {
            let ranker = Ranker::new(self.config().ranking);
            let global_max = self.max_import_count(root).await;
            ranker.rank(&vector_hits, query, global_max, false)
        } else {
            vector_hits
                .iter()
                .map(|h| crate::ranker::RankedResult {
                    content: h.content.clone(),
                    relative_path: h.relative_path.clone(),
                    start_line: h.start_line,
                    end_line: h.end_line,
                    language: language_of(h),
                    score: h.vector_score,
                    factors: None,
                })
                .collect()
        };

        Ok(ranked
            .into_iter()
            .filter(|r| r.score >= min_score)
            .map(|r| QueryHit {
                content: r.content,
                relative_path: r.relative_path,
                start_line: r.start_line,
                end_line: r.end_line,
                language: r.language,
                score: r.score,
            })
            .collect())
    }
}
