//! Offline A/B evaluation harness — applies two ranker configurations to
//! shared, pre-computed result sets and reports the difference in
//! information-retrieval quality between them.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ranker::{RankedResult, Ranker, RankingConfig, VectorHit};

/// A judged query: the query string plus relevant document identifiers in
/// decreasing relevance.
#[derive(Clone, Debug)]
pub struct TestQuery {
    pub query: String,
    pub relevant: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    pub ndcg: f64,
    pub mrr: f64,
    pub precision_at_5: f64,
    pub precision_at_10: f64,
}

impl Metrics {
    fn add(&mut self, other: Metrics) {
        self.ndcg += other.ndcg;
        self.mrr += other.mrr;
        self.precision_at_5 += other.precision_at_5;
        self.precision_at_10 += other.precision_at_10;
    }

    fn scaled(&self, n: f64) -> Metrics {
        Metrics { ndcg: self.ndcg / n, mrr: self.mrr / n, precision_at_5: self.precision_at_5 / n, precision_at_10: self.precision_at_10 / n }
    }

    fn minus(&self, other: &Metrics) -> Metrics {
        Metrics {
            ndcg: self.ndcg - other.ndcg,
            mrr: self.mrr - other.mrr,
            precision_at_5: self.precision_at_5 - other.precision_at_5,
            precision_at_10: self.precision_at_10 - other.precision_at_10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Winner {
    A,
    B,
    Tie,
}

/// A document whose rank position changed by at least 3 slots between A and B.
#[derive(Clone, Debug)]
pub struct Mover {
    pub document_id: String,
    pub position_a: usize,
    pub position_b: usize,
    pub change: i64,
}

#[derive(Clone, Debug)]
pub struct PerQueryDetail {
    pub query: String,
    pub movers: Vec<Mover>,
}

#[derive(Clone, Debug)]
pub struct AbReport {
    pub name_a: String,
    pub name_b: String,
    pub queries_processed: usize,
    pub queries_skipped: usize,
    pub metrics_a: Metrics,
    pub metrics_b: Metrics,
    pub improvements: Metrics,
    pub winner: Winner,
    pub per_query_details: Vec<PerQueryDetail>,
}

fn document_id(result: &RankedResult) -> String {
    format!("{}:{}-{}", result.relative_path, result.start_line, result.end_line)
}

fn ndcg(ranked: &[RankedResult], relevant: &[String]) -> f64 {
    let relevant_count = relevant.len();
    if relevant_count == 0 {
        return 0.0;
    }

    let dcg: f64 = ranked
        .iter()
        .enumerate()
        .map(|(i, r)| match relevant.iter().position(|id| id == &document_id(r)) {
            Some(pos) => {
                let rel = (relevant_count - pos) as f64;
                rel / (i as f64 + 2.0).log2()
            }
            None => 0.0,
        })
        .sum();

    let ideal_n = ranked.len().min(relevant_count);
    let idcg: f64 = (0..ideal_n)
        .map(|i| {
            let rel = (relevant_count - i) as f64;
            rel / (i as f64 + 2.0).log2()
        })
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

fn mrr(ranked: &[RankedResult], relevant: &[String]) -> f64 {
    for (i, r) in ranked.iter().enumerate() {
        if relevant.iter().any(|id| id == &document_id(r)) {
            return 1.0 / (i as f64 + 1.0);
        }
    }
    0.0
}

fn precision_at_k(ranked: &[RankedResult], relevant: &[String], k: usize) -> f64 {
    let top_k = &ranked[..ranked.len().min(k)];
    let hits = top_k.iter().filter(|r| relevant.iter().any(|id| id == &document_id(r))).count();
    hits as f64 / k as f64
}

fn compute_metrics(ranked: &[RankedResult], relevant: &[String]) -> Metrics {
    Metrics {
        ndcg: ndcg(ranked, relevant),
        mrr: mrr(ranked, relevant),
        precision_at_5: precision_at_k(ranked, relevant, 5),
        precision_at_10: precision_at_k(ranked, relevant, 10),
    }
}

fn movers_between(ranked_a: &[RankedResult], ranked_b: &[RankedResult]) -> Vec<Mover> {
    let positions_a: HashMap<String, usize> =
        ranked_a.iter().enumerate().map(|(i, r)| (document_id(r), i)).collect();
    let positions_b: HashMap<String, usize> =
        ranked_b.iter().enumerate().map(|(i, r)| (document_id(r), i)).collect();

    let mut movers: Vec<Mover> = positions_a
        .iter()
        .filter_map(|(id, pos_a)| {
            let pos_b = positions_b.get(id)?;
            let change = *pos_a as i64 - *pos_b as i64;
            if change.abs() >= 3 {
                Some(Mover { document_id: id.clone(), position_a: *pos_a, position_b: *pos_b, change })
            } else {
                None
            }
        })
        .collect();

    movers.sort_by(|a, b| b.change.abs().cmp(&a.change.abs()).then(a.document_id.cmp(&b.document_id)));
    movers
}

/// Applies two named [`RankingConfig`]s to shared result sets and reports
/// aggregate NDCG, MRR, and Precision@k differences.
pub struct AbHarness {
    name_a: String,
    config_a: RankingConfig,
    name_b: String,
    config_b: RankingConfig,
}

impl AbHarness {
    pub fn new(name_a: impl Into<String>, config_a: RankingConfig, name_b: impl Into<String>, config_b: RankingConfig) -> Self {
        Self { name_a: name_a.into(), config_a, name_b: name_b.into(), config_b }
    }

    /// `results_by_query` maps a query string to its pre-computed vector-search
    /// results. Queries absent from the map, or mapped to an empty list, are
    /// skipped but still counted in the header.
    pub fn evaluate(
        &self,
        queries: &[TestQuery],
        results_by_query: &HashMap<String, Vec<VectorHit>>,
        include_details: bool,
    ) -> AbReport {
        let ranker_a = Ranker::new(self.config_a);
        let ranker_b = Ranker::new(self.config_b);

        let mut sum_a = Metrics::default();
        let mut sum_b = Metrics::default();
        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut details = Vec::new();

        for q in queries {
            let Some(hits) = results_by_query.get(&q.query) else {
                skipped += 1;
                continue;
            };
            if hits.is_empty() {
                skipped += 1;
                continue;
            }

            let ranked_a = ranker_a.rank(hits, &q.query, None, false);
            let ranked_b = ranker_b.rank(hits, &q.query, None, false);

            sum_a.add(compute_metrics(&ranked_a, &q.relevant));
            sum_b.add(compute_metrics(&ranked_b, &q.relevant));
            processed += 1;

            if include_details {
                details.push(PerQueryDetail { query: q.query.clone(), movers: movers_between(&ranked_a, &ranked_b) });
            }
        }

        let n = processed.max(1) as f64;
        let metrics_a = sum_a.scaled(n);
        let metrics_b = sum_b.scaled(n);
        let improvements = metrics_b.minus(&metrics_a);

        let deltas =
            [improvements.ndcg, improvements.mrr, improvements.precision_at_5, improvements.precision_at_10];
        let (mut a_wins, mut b_wins) = (0, 0);
        for d in deltas {
            if d.abs() > 0.01 {
                if d > 0.0 {
                    b_wins += 1;
                } else {
                    a_wins += 1;
                }
            }
        }
        let winner = match b_wins.cmp(&a_wins) {
            std::cmp::Ordering::Greater => Winner::B,
            std::cmp::Ordering::Less => Winner::A,
            std::cmp::Ordering::Equal => Winner::Tie,
        };

        AbReport {
            name_a: self.name_a.clone(),
            name_b: self.name_b.clone(),
            queries_processed: processed,
            queries_skipped: skipped,
            metrics_a,
            metrics_b,
            improvements,
            winner,
            per_query_details: details,
        }
    }
}

/// Renders a human-readable summary block: counts, both configurations' four
/// metrics, the overall winner, and signed per-metric improvements.
pub fn format_report(report: &AbReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "A/B evaluation: {} queries processed, {} skipped",
        report.queries_processed, report.queries_skipped
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<20} NDCG={:.4}  MRR={:.4}  P@5={:.4}  P@10={:.4}",
        report.name_a, report.metrics_a.ndcg, report.metrics_a.mrr, report.metrics_a.precision_at_5, report.metrics_a.precision_at_10
    );
    let _ = writeln!(
        out,
        "{:<20} NDCG={:.4}  MRR={:.4}  P@5={:.4}  P@10={:.4}",
        report.name_b, report.metrics_b.ndcg, report.metrics_b.mrr, report.metrics_b.precision_at_5, report.metrics_b.precision_at_10
    );
    let _ = writeln!(out);
    let winner_label = match report.winner {
        Winner::A => report.name_a.as_str(),
        Winner::B => report.name_b.as_str(),
        Winner::Tie => "tie",
    };
    let _ = writeln!(out, "Winner: {winner_label}");
    let _ = writeln!(
        out,
        "Improvements (B-A): NDCG={:+.4}  MRR={:+.4}  P@5={:+.4}  P@10={:+.4}",
        report.improvements.ndcg, report.improvements.mrr, report.improvements.precision_at_5, report.improvements.precision_at_10
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn hit(path: &str, start: usize, end: usize, vector_score: f64) -> VectorHit {
        VectorHit {
            content: "content".to_string(),
            relative_path: path.to_string(),
            start_line: start,
            end_line: end,
            extension: "rs".to_string(),
            modified_at_ms: 0,
            vector_score,
            metadata: Map::new(),
        }
    }

    #[test]
    fn ndcg_is_one_for_perfect_ranking() {
        let ranker = Ranker::new(RankingConfig { enabled: false, ..RankingConfig::default() });
        let hits = vec![hit("a.rs", 1, 5, 0.9), hit("b.rs", 1, 5, 0.5)];
        let ranked = ranker.rank(&hits, "", None, false);
        let relevant = vec!["a.rs:1-5".to_string(), "b.rs:1-5".to_string()];
        assert!((ndcg(&ranked, &relevant) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mrr_zero_when_no_relevant_document_present() {
        let ranker = Ranker::new(RankingConfig { enabled: false, ..RankingConfig::default() });
        let hits = vec![hit("a.rs", 1, 5, 0.9)];
        let ranked = ranker.rank(&hits, "", None, false);
        assert_eq!(mrr(&ranked, &["z.rs:1-5".to_string()]), 0.0);
    }

    #[test]
    fn precision_at_k_always_divides_by_k_not_result_count() {
        let ranker = Ranker::new(RankingConfig { enabled: false, ..RankingConfig::default() });
        let hits = vec![hit("a.rs", 1, 5, 0.9)];
        let ranked = ranker.rank(&hits, "", None, false);
        let relevant = vec!["a.rs:1-5".to_string()];
        assert_eq!(precision_at_k(&ranked, &relevant, 5), 0.2);
    }

    #[test]
    fn evaluate_skips_queries_with_no_results_but_counts_them() {
        let harness = AbHarness::new("A", RankingConfig::default(), "B", RankingConfig::default());
        let queries = vec![
            TestQuery { query: "present".to_string(), relevant: vec!["a.rs:1-5".to_string()] },
            TestQuery { query: "missing".to_string(), relevant: vec![] },
        ];
        let mut results = Map::new();
        results.insert("present".to_string(), vec![hit("a.rs", 1, 5, 0.8)]);

        let report = harness.evaluate(&queries, &results, true);
        assert_eq!(report.queries_processed, 1);
        assert_eq!(report.queries_skipped, 1);
    }

    #[test]
    fn winner_requires_majority_of_metrics_past_threshold() {
        let config_a = RankingConfig { enabled: false, ..RankingConfig::default() };
        let config_b = config_a;
        let harness = AbHarness::new("A", config_a, "B", config_b);
        let queries = vec![TestQuery { query: "q".to_string(), relevant: vec!["a.rs:1-5".to_string()] }];
        let mut results = Map::new();
        results.insert("q".to_string(), vec![hit("a.rs", 1, 5, 0.8)]);
        let report = harness.evaluate(&queries, &results, false);
        // Identical configs: no metric differs, so the result must be a tie.
        assert_eq!(report.winner, Winner::Tie);
    }
}
