//! Multi-factor ranker — blends vector similarity with recency, import-graph
//! centrality, and term-frequency signals into a single calibrated score.

use regex::escape;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Four weights in `[0, 1]` that should sum to ~1.0, a recency half-life in
/// days, and an enabled flag. Weight-sum validation only warns — it never
/// rejects a configuration.
#[derive(Clone, Copy, Debug)]
pub struct RankingConfig {
    pub weight_vector: f64,
    pub weight_recency: f64,
    pub weight_import: f64,
    pub weight_term_frequency: f64,
    pub recency_half_life_days: f64,
    pub enabled: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let config = Self {
            weight_vector: 0.5,
            weight_recency: 0.2,
            weight_import: 0.2,
            weight_term_frequency: 0.1,
            recency_half_life_days: 90.0,
            enabled: true,
        };
        config.warn_if_unbalanced();
        config
    }
}

impl RankingConfig {
    pub fn weight_sum(&self) -> f64 {
        self.weight_vector + self.weight_recency + self.weight_import + self.weight_term_frequency
    }

    fn warn_if_unbalanced(&self) {
        let sum = self.weight_sum();
        if (sum - 1.0).abs() > 0.001 {
            warn!(sum, "ranking weights do not sum to 1.0");
        }
    }
}

/// A single candidate as it comes back from the vector store, before ranking.
#[derive(Clone, Debug)]
pub struct VectorHit {
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// File extension without the leading dot, e.g. `"rs"`.
    pub extension: String,
    /// Owning file's modification time, epoch milliseconds.
    pub modified_at_ms: u64,
    /// Upstream similarity score, already in `[0, 1]`.
    pub vector_score: f64,
    /// Arbitrary metadata; `importCount` and `language` are read if present.
    pub metadata: HashMap<String, Value>,
}

/// Per-result factor breakdown, all in `[0, 1]`. Only produced when ranking is
/// enabled and detail was requested.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankingFactors {
    pub vector: f64,
    pub recency: f64,
    pub import: f64,
    pub term_frequency: f64,
}

#[derive(Clone, Debug)]
pub struct RankedResult {
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub score: f64,
    pub factors: Option<RankingFactors>,
}

fn import_count_of(hit: &VectorHit) -> f64 {
    hit.metadata.get("importCount").and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn language_of(hit: &VectorHit) -> String {
    hit.metadata
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| hit.extension.trim_start_matches('.').to_string())
}

fn current_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn recency_factor(modified_at_ms: u64, now_ms: u64, half_life_days: f64) -> f64 {
    let age_ms = now_ms.saturating_sub(modified_at_ms) as f64;
    let age_days = age_ms / MS_PER_DAY;
    let factor = 2f64.powf(-age_days / half_life_days);
    factor.clamp(0.0, 1.0)
}

fn import_factor(count: f64, denominator: f64) -> f64 {
    if count <= 0.0 && denominator <= 0.0 {
        0.0
    } else if denominator <= 0.0 {
        0.0
    } else {
        (count / denominator).clamp(0.0, 1.0)
    }
}

fn term_frequency_factor(content: &str, query: &str) -> f64 {
    let terms: Vec<&str> = query.split_whitespace().collect();
    let words = content.split_whitespace().count();
    if terms.is_empty() || words == 0 {
        return 0.0;
    }

    let lower = content.to_lowercase();
    let mut matches = 0usize;
    for term in &terms {
        let lower_term = term.to_lowercase();
        if lower_term.is_empty() {
            continue;
        }
        let Ok(re) = regex::Regex::new(&escape(&lower_term)) else { continue };
        matches += re.find_iter(&lower).count();
    }

    if matches == 0 {
        return 0.0;
    }

    let x = matches as f64 / words as f64;
    (1.0 - (-100.0 * x).exp()).clamp(0.0, 1.0)
}

/// Stateless apart from its configuration — combines vector, recency, import,
/// and term-frequency factors into one final score per result.
#[derive(Clone, Debug)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        config.warn_if_unbalanced();
        Self { config }
    }

    pub fn update_config(&mut self, config: RankingConfig) {
        config.warn_if_unbalanced();
        self.config = config;
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Rank `results` for `query`. `global_max_import` is the coordinator's
    /// globally-known max import count across the collection; when `None`,
    /// the maximum within `results` is used instead (with a warning, since
    /// that makes scores incomparable across queries).
    pub fn rank(
        &self,
        results: &[VectorHit],
        query: &str,
        global_max_import: Option<f64>,
        include_details: bool,
    ) -> Vec<RankedResult> {
        self.rank_at(results, query, global_max_import, include_details, current_millis())
    }

    /// Same as [`Ranker::rank`] but with an explicit "now", for deterministic tests.
    pub fn rank_at(
        &self,
        results: &[VectorHit],
        query: &str,
        global_max_import: Option<f64>,
        include_details: bool,
        now_ms: u64,
    ) -> Vec<RankedResult> {
        if !self.config.enabled {
            return results
                .iter()
                .map(|hit| RankedResult {
                    content: hit.content.clone(),
                    relative_path: hit.relative_path.clone(),
                    start_line: hit.start_line,
                    end_line: hit.end_line,
                    language: language_of(hit),
                    score: hit.vector_score,
                    factors: None,
                })
                .collect();
        }

        let import_denominator = match global_max_import {
            Some(max) if max > 0.0 => max,
            Some(_) => 0.0,
            None => {
                let local_max =
                    results.iter().map(import_count_of).fold(0.0_f64, f64::max);
                if local_max > 0.0 {
                    warn!(
                        "no global max import count supplied; falling back to the current \
                         result set's maximum, which makes scores incomparable across queries"
                    );
                }
                local_max
            }
        };

        let mut scored: Vec<(usize, RankedResult)> = results
            .iter()
            .enumerate()
            .map(|(idx, hit)| {
                let vector = hit.vector_score.clamp(0.0, 1.0);
                let recency = recency_factor(hit.modified_at_ms, now_ms, self.config.recency_half_life_days);
                let import = import_factor(import_count_of(hit), import_denominator);
                let term_frequency = term_frequency_factor(&hit.content, query);

                let score = (self.config.weight_vector * vector
                    + self.config.weight_recency * recency
                    + self.config.weight_import * import
                    + self.config.weight_term_frequency * term_frequency)
                    .clamp(0.0, 1.0);

                let factors =
                    include_details.then_some(RankingFactors { vector, recency, import, term_frequency });

                (
                    idx,
                    RankedResult {
                        content: hit.content.clone(),
                        relative_path: hit.relative_path.clone(),
                        start_line: hit.start_line,
                        end_line: hit.end_line,
                        language: language_of(hit),
                        score,
                        factors,
                    },
                )
            })
            .collect();

        // Stable sort descending by score; ties retain input order because we
        // sort the (original_index, result) pairs and Rust's sort is stable.
        scored.sort_by(|a, b| {
            b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });

        scored.into_iter().map(|(_, r)| r).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, vector_score: f64, modified_at_ms: u64, content: &str) -> VectorHit {
        VectorHit {
            content: content.to_string(),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 10,
            extension: "rs".to_string(),
            modified_at_ms,
            vector_score,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn disabled_ranker_passes_through_vector_score_and_order() {
        let config = RankingConfig { enabled: false, ..RankingConfig::default() };
        let ranker = Ranker::new(config);
        let results = vec![hit("a.rs", 0.3, 0, "a"), hit("b.rs", 0.9, 0, "b")];
        let ranked = ranker.rank_at(&results, "anything", None, true, 1_000_000);
        assert_eq!(ranked[0].relative_path, "a.rs");
        assert_eq!(ranked[1].relative_path, "b.rs");
        assert_eq!(ranked[0].score, 0.3);
        assert_eq!(ranked[1].score, 0.9);
        assert!(ranked[0].factors.is_none());
    }

    #[test]
    fn identical_non_vector_factors_reorder_purely_by_vector_score() {
        let ranker = Ranker::new(RankingConfig::default());
        let now = 1_000_000_000_000u64;
        let results = vec![hit("low.rs", 0.2, now, "same content"), hit("high.rs", 0.8, now, "same content")];
        let ranked = ranker.rank_at(&results, "query", Some(1.0), false, now);
        assert_eq!(ranked[0].relative_path, "high.rs");
        assert_eq!(ranked[1].relative_path, "low.rs");
    }

    #[test]
    fn recency_sorts_recent_result_first_with_equal_vector_score() {
        let now = 1_000_000_000_000u64;
        let year_ms = 365 * 86_400_000u64;
        let config = RankingConfig {
            weight_vector: 0.5,
            weight_recency: 0.2,
            weight_import: 0.2,
            weight_term_frequency: 0.1,
            recency_half_life_days: 90.0,
            enabled: true,
        };
        let ranker = Ranker::new(config);
        let results = vec![
            hit("old.rs", 0.7, now - year_ms, "identical content here"),
            hit("new.rs", 0.7, now, "identical content here"),
        ];
        let ranked = ranker.rank_at(&results, "", Some(1.0), true, now);
        assert_eq!(ranked[0].relative_path, "new.rs");

        let old_factors = ranked.iter().find(|r| r.relative_path == "old.rs").unwrap().factors.unwrap();
        assert!(old_factors.recency < 0.1, "old recency factor should be tiny: {}", old_factors.recency);
    }

    #[test]
    fn import_score_normalizes_to_one_at_the_max() {
        let ranker = Ranker::new(RankingConfig::default());
        let mut a = hit("a.rs", 0.5, 0, "text");
        a.metadata.insert("importCount".to_string(), Value::from(10));
        let mut b = hit("b.rs", 0.5, 0, "text");
        b.metadata.insert("importCount".to_string(), Value::from(5));

        let ranked = ranker.rank_at(&[a, b], "text", None, true, 0);
        let max_import_factor =
            ranked.iter().map(|r| r.factors.unwrap().import).fold(0.0_f64, f64::max);
        assert_eq!(max_import_factor, 1.0);
    }

    #[test]
    fn term_frequency_is_zero_with_no_query_tokens() {
        assert_eq!(term_frequency_factor("some content", ""), 0.0);
        assert_eq!(term_frequency_factor("", "query"), 0.0);
    }

    #[test]
    fn term_frequency_saturates_with_repeated_matches() {
        let tf = term_frequency_factor("match match match match match", "match");
        assert!(tf > 0.9, "expected near-saturated term frequency, got {tf}");
    }

    #[test]
    fn weight_sum_validation_warns_but_does_not_reject() {
        let config = RankingConfig { weight_vector: 10.0, ..RankingConfig::default() };
        // Construction must not panic even though weights are wildly unbalanced.
        let _ranker = Ranker::new(config);
    }
}
