//! Retrieval curation: threshold, dedup and per-document diversity cap.
//!
//! Raw nearest-neighbor hits are over-fetched from the index and narrowed
//! down here to the passages the model gets to see. Curation is a pure
//! function of its inputs.

use super::types::SearchHit;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CurationError {
    #[error("top_k must be at least 1")]
    ZeroTopK,

    #[error("max_per_doc must be at least 1")]
    ZeroMaxPerDoc,

    #[error("score_threshold must be a finite number, got {0}")]
    InvalidThreshold(f32),
}

/// Validated curation parameters.
///
/// Only constructible through [`CurationParams::new`], so a curator never
/// runs with a cap that would silently discard everything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurationParams {
    score_threshold: f32,
    top_k: usize,
    max_per_doc: usize,
}

impl CurationParams {
    pub fn new(score_threshold: f32, top_k: usize, max_per_doc: usize) -> Result<Self, CurationError> {
        if !score_threshold.is_finite() {
            return Err(CurationError::InvalidThreshold(score_threshold));
        }
        if top_k == 0 {
            return Err(CurationError::ZeroTopK);
        }
        if max_per_doc == 0 {
            return Err(CurationError::ZeroMaxPerDoc);
        }
        Ok(Self {
            score_threshold,
            top_k,
            max_per_doc,
        })
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn max_per_doc(&self) -> usize {
        self.max_per_doc
    }
}

/// Number of raw candidates to request from the index for a given `top_k`.
///
/// Threshold and diversity filtering discard hits, so the index is asked for
/// several times more than will be kept.
pub fn overfetch_limit(top_k: usize) -> usize {
    20.max(top_k.saturating_mul(5))
}

/// Selects the grounding context for one query.
///
/// Hits are re-sorted by descending score regardless of how the index
/// returned them; the sort is stable, so equal scores keep index order.
/// The per-document cap is applied over the whole filtered pool before
/// truncating to `top_k`.
pub fn curate(hits: &[SearchHit], params: &CurationParams) -> Vec<SearchHit> {
    let mut ranked: Vec<&SearchHit> = hits.iter().collect();
    ranked.sort_by(|a, b| by_score_desc(a.score, b.score));

    let mut seen: HashSet<(&str, u64)> = HashSet::new();
    let mut per_doc: HashMap<&str, usize> = HashMap::new();
    let mut curated = Vec::new();

    for hit in ranked
        .into_iter()
        .filter(|h| h.score >= params.score_threshold)
    {
        let key = (hit.doc_id.as_str(), hit.chunk_id);
        if seen.contains(&key) {
            continue;
        }

        let count = per_doc.entry(hit.doc_id.as_str()).or_insert(0);
        if *count >= params.max_per_doc {
            continue;
        }

        *count += 1;
        seen.insert(key);
        curated.push(hit.clone());
    }

    curated.truncate(params.top_k);
    curated
}

/// Descending order with NaN scores sorted last.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: &str, chunk: u64, score: f32) -> SearchHit {
        SearchHit::new(doc, chunk, format!("{doc} passage {chunk}"), score)
    }

    fn params(threshold: f32, top_k: usize, max_per_doc: usize) -> CurationParams {
        CurationParams::new(threshold, top_k, max_per_doc).unwrap()
    }

    fn keys(hits: &[SearchHit]) -> Vec<(String, u64)> {
        hits.iter().map(|h| (h.doc_id.clone(), h.chunk_id)).collect()
    }

    /// A mixed pool: duplicates, several chunks per doc, scores on both
    /// sides of 0.5 and out-of-order input.
    fn messy_pool() -> Vec<SearchHit> {
        vec![
            hit("a", 0, 0.91),
            hit("b", 2, 0.40),
            hit("a", 1, 0.88),
            hit("a", 0, 0.91),
            hit("c", 0, 0.75),
            hit("a", 2, 0.86),
            hit("b", 0, 0.74),
            hit("c", 1, 0.55),
            hit("d", 0, 0.49),
            hit("b", 1, 0.73),
            hit("c", 2, 0.51),
        ]
    }

    #[test]
    fn test_diversity_cap_scenario() {
        let hits = vec![hit("docA", 0, 0.9), hit("docA", 1, 0.85), hit("docB", 0, 0.6)];
        let curated = curate(&hits, &params(0.5, 4, 1));
        assert_eq!(
            keys(&curated),
            vec![("docA".to_string(), 0), ("docB".to_string(), 0)]
        );
    }

    #[test]
    fn test_all_below_threshold_is_empty() {
        let hits = vec![hit("a", 0, 0.3), hit("b", 0, 0.49)];
        assert!(curate(&hits, &params(0.5, 4, 2)).is_empty());
    }

    #[test]
    fn test_duplicate_pair_kept_once() {
        let hits = vec![hit("a", 7, 0.2), hit("a", 7, 0.2)];
        let curated = curate(&hits, &params(0.0, 4, 2));
        assert_eq!(keys(&curated), vec![("a".to_string(), 7)]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let hits = vec![hit("a", 0, 0.5)];
        assert_eq!(curate(&hits, &params(0.5, 4, 2)).len(), 1);
    }

    #[test]
    fn test_threshold_one_filters_everything_below_perfect() {
        let hits = vec![hit("a", 0, 0.999), hit("b", 0, 1.0)];
        let curated = curate(&hits, &params(1.0, 4, 2));
        assert_eq!(keys(&curated), vec![("b".to_string(), 0)]);
    }

    #[test]
    fn test_unsorted_input_is_resorted() {
        let hits = vec![hit("a", 0, 0.6), hit("b", 0, 0.9), hit("c", 0, 0.7)];
        let curated = curate(&hits, &params(0.0, 3, 1));
        assert_eq!(
            keys(&curated),
            vec![("b".to_string(), 0), ("c".to_string(), 0), ("a".to_string(), 0)]
        );
    }

    #[test]
    fn test_ties_keep_index_order() {
        let hits = vec![hit("x", 0, 0.8), hit("y", 0, 0.8), hit("z", 0, 0.8)];
        let curated = curate(&hits, &params(0.0, 3, 1));
        assert_eq!(
            keys(&curated),
            vec![("x".to_string(), 0), ("y".to_string(), 0), ("z".to_string(), 0)]
        );
    }

    #[test]
    fn test_cap_applies_before_truncation() {
        // The first four raw hits are all from "a"; with cap 1 the later
        // documents must still fill the remaining slots.
        let hits = vec![
            hit("a", 0, 0.95),
            hit("a", 1, 0.94),
            hit("a", 2, 0.93),
            hit("a", 3, 0.92),
            hit("b", 0, 0.70),
            hit("c", 0, 0.65),
        ];
        let curated = curate(&hits, &params(0.5, 3, 1));
        assert_eq!(
            keys(&curated),
            vec![("a".to_string(), 0), ("b".to_string(), 0), ("c".to_string(), 0)]
        );
    }

    #[test]
    fn test_below_threshold_does_not_consume_cap() {
        let hits = vec![hit("a", 0, 0.2), hit("a", 1, 0.8)];
        let curated = curate(&hits, &params(0.5, 4, 1));
        assert_eq!(keys(&curated), vec![("a".to_string(), 1)]);
    }

    #[test]
    fn test_nan_scores_never_admitted() {
        let hits = vec![hit("a", 0, f32::NAN), hit("b", 0, 0.6)];
        let curated = curate(&hits, &params(0.0, 4, 2));
        assert_eq!(keys(&curated), vec![("b".to_string(), 0)]);
    }

    #[test]
    fn test_invariants_hold_across_parameter_grid() {
        let pool = messy_pool();
        for threshold in [0.0, 0.5, 0.74, 0.9, 1.0] {
            for top_k in 1..=8 {
                for max_per_doc in 1..=4 {
                    let p = params(threshold, top_k, max_per_doc);
                    let curated = curate(&pool, &p);

                    let passing = pool.iter().filter(|h| h.score >= threshold).count();
                    assert!(curated.len() <= top_k.min(passing));

                    let mut pairs = HashSet::new();
                    let mut docs: HashMap<&str, usize> = HashMap::new();
                    for h in &curated {
                        assert!(h.score >= threshold);
                        assert!(pairs.insert((h.doc_id.as_str(), h.chunk_id)));
                        *docs.entry(h.doc_id.as_str()).or_default() += 1;
                    }
                    assert!(docs.values().all(|&n| n <= max_per_doc));
                    assert!(curated.windows(2).all(|w| w[0].score >= w[1].score));
                }
            }
        }
    }

    #[test]
    fn test_curation_is_idempotent() {
        let pool = messy_pool();
        let p = params(0.5, 4, 2);
        assert_eq!(curate(&pool, &p), curate(&pool, &p));
    }

    #[test]
    fn test_params_reject_zero_max_per_doc() {
        assert_eq!(CurationParams::new(0.5, 4, 0), Err(CurationError::ZeroMaxPerDoc));
    }

    #[test]
    fn test_params_reject_zero_top_k_and_nan() {
        assert_eq!(CurationParams::new(0.5, 0, 2), Err(CurationError::ZeroTopK));
        assert!(matches!(
            CurationParams::new(f32::NAN, 4, 2),
            Err(CurationError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_overfetch_limit() {
        assert_eq!(overfetch_limit(1), 20);
        assert_eq!(overfetch_limit(4), 20);
        assert_eq!(overfetch_limit(5), 25);
        assert_eq!(overfetch_limit(12), 60);
    }
}
